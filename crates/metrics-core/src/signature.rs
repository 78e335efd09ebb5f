use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::ModelError;
use crate::metric::MetricRecord;

type HmacSha256 = Hmac<Sha256>;

/// Signs and verifies [`MetricRecord`]s with a keyed HMAC-SHA256 over the
/// canonical string `"{id}:{kind}:{value}"`.
///
/// An empty key disables signing: [`SignatureService::sign`] returns `None`
/// and [`SignatureService::verify`] accepts any record, matching the wire
/// contract where the hash field is ignored on ingress and omitted on egress
/// when no key is configured.
#[derive(Clone)]
pub struct SignatureService {
    key: Vec<u8>,
}

impl SignatureService {
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        SignatureService { key: key.into() }
    }

    pub fn is_enabled(&self) -> bool {
        !self.key.is_empty()
    }

    fn canonical_string(&self, record: &MetricRecord) -> String {
        format!(
            "{}:{}:{}",
            record.id,
            record.kind,
            record.canonical_value_string()
        )
    }

    fn mac_for(&self, canonical: &str) -> HmacSha256 {
        let mut mac =
            HmacSha256::new_from_slice(&self.key).expect("HMAC accepts keys of any length");
        mac.update(canonical.as_bytes());
        mac
    }

    /// Returns the hex-encoded signature for `record`, or `None` when
    /// signing is disabled (empty key).
    pub fn sign(&self, record: &MetricRecord) -> Option<String> {
        if !self.is_enabled() {
            return None;
        }
        let canonical = self.canonical_string(record);
        let tag = self.mac_for(&canonical).finalize().into_bytes();
        Some(hex::encode(tag))
    }

    /// Verifies `record.hash` against the record's canonical string.
    ///
    /// When signing is disabled this always succeeds. When enabled, a
    /// missing or malformed hash, or a mismatching one, is rejected.
    /// Comparison is constant-time over the decoded byte sequences.
    pub fn verify(&self, record: &MetricRecord) -> Result<(), ModelError> {
        if !self.is_enabled() {
            return Ok(());
        }
        let hash = record
            .hash
            .as_deref()
            .ok_or_else(|| ModelError::SignatureMismatch { id: record.id.clone() })?;
        let provided = hex::decode(hash)
            .map_err(|_| ModelError::MalformedHash { id: record.id.clone() })?;

        let canonical = self.canonical_string(record);
        let expected = self.mac_for(&canonical).finalize().into_bytes();

        if expected.ct_eq(&provided[..]).unwrap_u8() == 1 {
            Ok(())
        } else {
            Err(ModelError::SignatureMismatch { id: record.id.clone() })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::MetricRecord;

    #[test]
    fn disabled_when_key_empty() {
        let svc = SignatureService::new(Vec::new());
        assert!(!svc.is_enabled());
        let record = MetricRecord::gauge("Alloc", 1.0);
        assert_eq!(svc.sign(&record), None);
        assert!(svc.verify(&record).is_ok());
    }

    #[test]
    fn round_trips_gauge_signature() {
        let svc = SignatureService::new(b"k".to_vec());
        let mut record = MetricRecord::gauge("A", 1.0);
        record.hash = svc.sign(&record);
        assert!(svc.verify(&record).is_ok());
    }

    #[test]
    fn rejects_flipped_hash_nibble() {
        let svc = SignatureService::new(b"k".to_vec());
        let mut record = MetricRecord::gauge("A", 1.0);
        let mut hash = svc.sign(&record).unwrap();
        let last = hash.pop().unwrap();
        let flipped = if last == '0' { '1' } else { '0' };
        hash.push(flipped);
        record.hash = Some(hash);
        assert!(svc.verify(&record).is_err());
    }

    #[test]
    fn canonical_string_matches_spec_example() {
        let svc = SignatureService::new(b"k".to_vec());
        let record = MetricRecord::gauge("A", 1.0);
        assert_eq!(svc.canonical_string(&record), "A:gauge:1.000000");
    }

    #[test]
    fn counter_signature_round_trips() {
        let svc = SignatureService::new(b"secret".to_vec());
        let mut record = MetricRecord::counter("PollCount", 7);
        record.hash = svc.sign(&record);
        assert!(svc.verify(&record).is_ok());
    }

    #[test]
    fn missing_hash_rejected_when_enabled() {
        let svc = SignatureService::new(b"k".to_vec());
        let record = MetricRecord::gauge("A", 1.0);
        assert!(svc.verify(&record).is_err());
    }
}
