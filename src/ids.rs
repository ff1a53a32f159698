use crate::error::StoreError;
use tokio::sync::Mutex;

/// Computes the next identifier for one entity class: the smallest
/// non-negative integer not present among the stored keys, formatted as
/// `<prefix><n>`. Identifiers freed by deletion are reused before the
/// range grows.
pub fn next_id(prefix: &'static str, keys: &[String]) -> Result<String, StoreError> {
    let mut numbers = Vec::with_capacity(keys.len());
    for key in keys {
        let digits = key.strip_prefix(prefix).ok_or_else(|| StoreError::AllocationIntegrity {
            id: key.clone(),
            prefix,
        })?;
        if digits.is_empty() || !digits.bytes().all(|byte| byte.is_ascii_digit()) {
            return Err(StoreError::AllocationIntegrity {
                id: key.clone(),
                prefix,
            });
        }
        let value: u64 = digits.parse().map_err(|_| StoreError::AllocationIntegrity {
            id: key.clone(),
            prefix,
        })?;
        numbers.push(value);
    }
    numbers.sort_unstable();

    let mut next = 0u64;
    for value in numbers {
        if value == next {
            next += 1;
        } else if value > next {
            break;
        }
    }
    Ok(format!("{prefix}{next}"))
}

/// One lock per gap-filled entity class. The scan-then-insert sequence
/// of a creation must run under the class lock so two concurrent
/// creations cannot compute the same identifier.
#[derive(Default)]
pub struct Allocators {
    pub place: Mutex<()>,
    pub product: Mutex<()>,
    pub order: Mutex<()>,
}
