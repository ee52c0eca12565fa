//! Named bundles: server-side expansion of `{bundle, tokens}` into channel sets.
//!
//! Bundles only ever produce `token.<id>` channels — they never touch
//! `user.*` or `global`, per the glossary's definition ("each a fixed subset
//! of the eight type tags crossed with the client's tokens").

use crate::channel::Channel;
use crate::error::CoreError;
use crate::topic::Topic;

/// One of the six fixed named bundles a client can request instead of an
/// explicit channel list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bundle {
    /// Trade executions only.
    Trading,
    /// Trades, liquidity, metadata, creation, analytics.
    FullMarket,
    /// Social and community activity.
    Community,
    /// Balances and metadata — a client's own holdings view.
    Portfolio,
    /// Trades only, for ticker-style UIs (alias of `Trading` at the topic
    /// level, kept distinct since it's a separately documented bundle name).
    PriceOnly,
    /// Every topic-derived type tag.
    All,
}

impl Bundle {
    /// Parse a bundle name (case-sensitive, matching the wire protocol's
    /// upper-case constants).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownBundle`] if `name` isn't one of the six
    /// fixed bundles.
    pub fn parse(name: &str) -> Result<Self, CoreError> {
        match name {
            "TRADING" => Ok(Self::Trading),
            "FULL_MARKET" => Ok(Self::FullMarket),
            "COMMUNITY" => Ok(Self::Community),
            "PORTFOLIO" => Ok(Self::Portfolio),
            "PRICE_ONLY" => Ok(Self::PriceOnly),
            "ALL" => Ok(Self::All),
            other => Err(CoreError::UnknownBundle(other.to_string())),
        }
    }

    /// The topics this bundle covers.
    #[must_use]
    pub const fn topics(self) -> &'static [Topic] {
        match self {
            Self::Trading | Self::PriceOnly => &[Topic::Trades],
            Self::FullMarket => &[
                Topic::Trades,
                Topic::Liquidity,
                Topic::Metadata,
                Topic::Creation,
                Topic::Analytics,
            ],
            Self::Community => &[Topic::Social, Topic::Community],
            Self::Portfolio => &[Topic::Balances, Topic::Metadata],
            Self::All => &Topic::ALL,
        }
    }

    /// Expand this bundle against a client-supplied token list into the
    /// concrete `token.<id>` channel set.
    ///
    /// Every bundle maps to `token.<id>` channels only; the bundle's topic
    /// coverage governs which envelope `type` tags a subscriber will
    /// actually see once events start flowing, not which channels are
    /// subscribed — subscription is per-token, filtering by type happens
    /// client-side on the envelope's `type` field.
    #[must_use]
    pub fn expand(self, tokens: &[String]) -> Vec<Channel> {
        tokens.iter().map(|id| Channel::token(id)).collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_six_bundles() {
        for name in ["TRADING", "FULL_MARKET", "COMMUNITY", "PORTFOLIO", "PRICE_ONLY", "ALL"] {
            assert!(Bundle::parse(name).is_ok(), "{name} should parse");
        }
        assert!(Bundle::parse("NOPE").is_err());
    }

    #[test]
    fn expand_produces_one_token_channel_per_token() {
        let channels = Bundle::Trading.expand(&["BTC".to_string(), "ETH".to_string()]);
        assert_eq!(channels, vec![Channel::token("BTC"), Channel::token("ETH")]);
    }

    #[test]
    fn all_bundle_covers_every_topic() {
        assert_eq!(Bundle::All.topics().len(), 8);
    }
}
