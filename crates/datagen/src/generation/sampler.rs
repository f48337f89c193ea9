use rand::Rng;

use crate::error::{DatagenError, DatagenResult};

/// A fixed set of popular join keys.
///
/// The hot set is chosen once per run and is never resampled, so that every
/// fact row draws its popular keys from the same small working set.
#[derive(Debug, Clone)]
pub struct HotSet {
    keys: Vec<i64>,
}

impl HotSet {
    /// Samples each key independently with probability `fraction`, in input order,
    /// and stops once `cap` keys are taken.
    ///
    /// If no key is taken but the input is not empty, one key is chosen uniformly
    /// so that the hot set is never empty.
    pub fn sample<I, R>(keys: I, fraction: f64, cap: usize, rng: &mut R) -> DatagenResult<Self>
    where
        I: IntoIterator<Item = i64>,
        R: Rng,
    {
        if !(0.0..=1.0).contains(&fraction) {
            return Err(DatagenError::invalid(format!(
                "hot set sample fraction must be in [0, 1]: {fraction}"
            )));
        }
        if cap == 0 {
            return Err(DatagenError::invalid("hot set cap must be positive"));
        }
        let mut sampled = Vec::with_capacity(cap.min(1024));
        // reservoir of one, used when the Bernoulli sample turns out empty
        let mut fallback = None;
        let mut seen = 0u64;
        for key in keys {
            seen += 1;
            if sampled.is_empty() && rng.random_range(0..seen) == 0 {
                fallback = Some(key);
            }
            if rng.random_bool(fraction) {
                sampled.push(key);
                if sampled.len() >= cap {
                    break;
                }
            }
        }
        if sampled.is_empty() {
            match fallback {
                Some(key) => sampled.push(key),
                None => return Err(DatagenError::empty_domain("no dimension keys to sample")),
            }
        }
        Ok(Self { keys: sampled })
    }

    pub fn from_keys(keys: Vec<i64>) -> DatagenResult<Self> {
        if keys.is_empty() {
            return Err(DatagenError::empty_domain("the hot set is empty"));
        }
        Ok(Self { keys })
    }

    pub fn keys(&self) -> &[i64] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Draws foreign keys with a popularity skew.
///
/// With probability `hot_fraction`, a key is drawn uniformly from the hot set.
/// Otherwise the key is drawn uniformly from the whole domain `[0, domain)`,
/// which includes the hot keys as well.
///
/// The hot set is sampled from a fraction of the dimension keys, so the keys
/// are not validated against the full dimension dataset. Referential integrity
/// holds only as long as the hot keys and the domain come from the same dense
/// id range.
#[derive(Debug, Clone)]
pub struct SkewedReferenceSampler {
    hot: HotSet,
    domain: i64,
    hot_fraction: f64,
}

impl SkewedReferenceSampler {
    pub fn try_new(hot: HotSet, domain: u64, hot_fraction: f64) -> DatagenResult<Self> {
        if domain == 0 {
            return Err(DatagenError::empty_domain("the dimension key domain is empty"));
        }
        if hot.is_empty() {
            return Err(DatagenError::empty_domain("the hot set is empty"));
        }
        if !(0.0..=1.0).contains(&hot_fraction) {
            return Err(DatagenError::invalid(format!(
                "hot fraction must be in [0, 1]: {hot_fraction}"
            )));
        }
        let domain = i64::try_from(domain)
            .map_err(|_| DatagenError::invalid(format!("key domain too large: {domain}")))?;
        Ok(Self {
            hot,
            domain,
            hot_fraction,
        })
    }

    pub fn hot_set(&self) -> &HotSet {
        &self.hot
    }

    pub fn sample<R: Rng>(&self, rng: &mut R) -> i64 {
        if rng.random_bool(self.hot_fraction) {
            self.hot.keys[rng.random_range(0..self.hot.len())]
        } else {
            rng.random_range(0..self.domain)
        }
    }

    /// The expected fraction of sampled keys that fall into the hot set,
    /// counting cold draws that happen to hit a hot key.
    pub fn hot_fraction_expected(&self) -> f64 {
        let hot_share = self.hot.len() as f64 / self.domain as f64;
        self.hot_fraction + (1.0 - self.hot_fraction) * hot_share.min(1.0)
    }
}
