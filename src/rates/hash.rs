use serde::Serialize;
use sha2::{Digest as _, Sha256};

use super::{Fees, Limits};

// Field order is part of the hash.
#[derive(Serialize)]
struct HashedPairData<'a> {
    rate: f64,
    fees: &'a Fees,
    limits: &'a Limits,
}

/// Hex SHA-256 over the JSON encoding of `{rate, fees, limits}`.
pub fn pair_hash(rate: f64, fees: &Fees, limits: &Limits) -> Result<String, serde_json::Error> {
    let encoded = serde_json::to_vec(&HashedPairData { rate, fees, limits })?;
    Ok(hex::encode(Sha256::digest(&encoded)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rates::{AssetPair, MinerFees, ReverseMinerFees, ZeroConfLimits};

    fn fees() -> Fees {
        let miner = MinerFees {
            normal: 280,
            reverse: ReverseMinerFees {
                lockup: 306,
                claim: 276,
            },
        };
        Fees {
            percentage: 1.0,
            miner_fees: AssetPair {
                base_asset: miner,
                quote_asset: miner,
            },
        }
    }

    fn limits() -> Limits {
        Limits {
            minimal: 10_000,
            maximal: 10_000_000,
            maximal_zero_conf: ZeroConfLimits {
                base_asset: Some(1_000_000),
                quote_asset: None,
            },
        }
    }

    #[test]
    fn hash_is_deterministic() {
        let a = pair_hash(0.005, &fees(), &limits()).unwrap();
        let b = pair_hash(0.005, &fees(), &limits()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn hash_covers_every_field() {
        let base = pair_hash(0.005, &fees(), &limits()).unwrap();

        assert_ne!(base, pair_hash(0.0051, &fees(), &limits()).unwrap());

        let mut changed_fees = fees();
        changed_fees.miner_fees.quote_asset.reverse.claim += 1;
        assert_ne!(base, pair_hash(0.005, &changed_fees, &limits()).unwrap());

        let mut changed_limits = limits();
        changed_limits.maximal_zero_conf.quote_asset = Some(1);
        assert_ne!(base, pair_hash(0.005, &fees(), &changed_limits).unwrap());
    }
}
