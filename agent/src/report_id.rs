use rand::RngCore;

/// 128 bits of randomness, hex-encoded — the idempotency key the
/// controller's `reports` table primary key rejects on retransmission.
pub fn new_report_id() -> String {
    let mut bytes = [0u8; 16];
    rand::rngs::ThreadRng::default().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
