//! Human-facing identifiers: payment references and ticket numbers.
//!
//! Both are a timestamp prefix plus a short random suffix. They are not unique
//! by construction; the store enforces uniqueness with constraints.

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;

const SUFFIX_LEN: usize = 6;
const BASE36: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

fn random_suffix() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SUFFIX_LEN)
        .map(|b| (b as char).to_ascii_uppercase())
        .collect()
}

fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }

    let mut digits = Vec::new();
    while value > 0 {
        digits.push(BASE36[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}

/// Reference sent to the payment processor, e.g. `REG_1718000000000_K3J9QZ`.
pub fn payment_reference(now: DateTime<Utc>) -> String {
    format!("REG_{}_{}", now.timestamp_millis(), random_suffix())
}

/// Printed on the ticket and encoded in its scannable payload, e.g. `TKT-LX2K9A1B-7QZ0PD`.
pub fn ticket_number(now: DateTime<Utc>) -> String {
    let millis = u64::try_from(now.timestamp_millis()).unwrap_or_default();
    format!("TKT-{}-{}", to_base36(millis), random_suffix())
}
