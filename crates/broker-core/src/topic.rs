//! Subscription topics of the form `perpetualId:chainId`.

use std::fmt;

use crate::chain::{ChainId, ChainRegistry};
use crate::error::{CoreError, CoreResult};

/// Smallest perpetual id the venue issues.
pub const MIN_PERPETUAL_ID: u32 = 100_000;

/// A validated order-update topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Topic {
    pub perpetual_id: u32,
    pub chain_id: ChainId,
}

impl Topic {
    pub fn new(perpetual_id: u32, chain_id: ChainId) -> Self {
        Self {
            perpetual_id,
            chain_id,
        }
    }

    /// Parse `^[0-9]+:[0-9]+$` without any domain checks.
    pub fn parse(raw: &str) -> CoreResult<Self> {
        let invalid = || CoreError::InvalidTopic(raw.to_string());
        let (perp, chain) = raw.split_once(':').ok_or_else(invalid)?;
        if !is_digits(perp) || !is_digits(chain) {
            return Err(invalid());
        }
        Ok(Self {
            perpetual_id: perp.parse().map_err(|_| invalid())?,
            chain_id: chain.parse().map_err(|_| invalid())?,
        })
    }

    /// Parse and require a real perpetual id on a registered chain.
    pub fn parse_valid(raw: &str, registry: &ChainRegistry) -> CoreResult<Self> {
        let topic = Self::parse(raw)?;
        if topic.perpetual_id < MIN_PERPETUAL_ID || !registry.contains(topic.chain_id) {
            return Err(CoreError::InvalidTopic(raw.to_string()));
        }
        Ok(topic)
    }
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.perpetual_id, self.chain_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::tests::sample_chain;

    fn registry() -> ChainRegistry {
        ChainRegistry::new(vec![sample_chain(1101)]).unwrap()
    }

    #[test]
    fn test_valid_topic() {
        let topic = Topic::parse_valid("100001:1101", &registry()).unwrap();
        assert_eq!(topic, Topic::new(100001, 1101));
        assert_eq!(topic.to_string(), "100001:1101");
    }

    #[test]
    fn test_perpetual_below_floor() {
        assert!(Topic::parse("42:1101").is_ok());
        assert!(Topic::parse_valid("42:1101", &registry()).is_err());
    }

    #[test]
    fn test_unregistered_chain() {
        assert!(Topic::parse_valid("100001:9999", &registry()).is_err());
    }

    #[test]
    fn test_malformed() {
        for raw in ["abc", "", ":", "1:", ":1", "1:2:3", "-1:2", "1 :2", "+1:2"] {
            assert!(
                matches!(Topic::parse(raw), Err(CoreError::InvalidTopic(_))),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn test_overflowing_digits_rejected() {
        assert!(Topic::parse("99999999999999999999:1").is_err());
    }
}
