//! # Key Generation
//!
//! CSPRNG material for device keys and setup tokens. Prefixes make the two
//! credential families visually distinct in logs and support dashboards.

use bridge_types::DeviceKey;
use rand::RngCore;

fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

/// Issue a fresh pre-shared device key (`DK_` + 64 hex chars).
#[must_use]
pub fn generate_device_key() -> DeviceKey {
    DeviceKey::new(format!("DK_{}", random_hex(32)))
}

/// Issue a fresh setup token string (`ST_` + 48 hex chars).
#[must_use]
pub fn generate_setup_token() -> String {
    format!("ST_{}", random_hex(24))
}
