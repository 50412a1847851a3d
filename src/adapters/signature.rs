use {
    crate::domain::error::BillingError,
    hmac::{Hmac, Mac},
    sha2::Sha256,
};

type HmacSha256 = Hmac<Sha256>;

/// Checks the provider's `Stripe-Signature` scheme: the header carries a
/// unix timestamp and one or more hex HMAC-SHA256 signatures over
/// `"{timestamp}.{body}"`. Secret rotation overlaps deliver several `v1`
/// entries; one match passes.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: String,
    tolerance_secs: i64,
}

impl SignatureVerifier {
    pub fn new(secret: impl Into<String>, tolerance_secs: i64) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs,
        }
    }

    /// Validate `header` against the raw request body at `now_unix`.
    /// Returns the signed timestamp so the caller can log delivery lag.
    pub fn verify(&self, body: &[u8], header: &str, now_unix: i64) -> Result<i64, BillingError> {
        let (timestamp, candidates) = parse_header(header)?;

        let age = now_unix - timestamp;
        if age.abs() > self.tolerance_secs {
            return Err(BillingError::SignatureInvalid(format!(
                "timestamp outside tolerance window ({age}s)"
            )));
        }

        let expected = self.compute(body, timestamp)?;
        if candidates.iter().any(|sig| constant_time_eq(sig, &expected)) {
            Ok(timestamp)
        } else {
            Err(BillingError::SignatureInvalid(
                "no matching v1 signature".to_string(),
            ))
        }
    }

    /// Hex HMAC over the provider's signed-payload convention. Public so
    /// tests can mint valid headers.
    pub fn compute(&self, body: &[u8], timestamp: i64) -> Result<String, BillingError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| BillingError::SignatureInvalid(e.to_string()))?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(body);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

fn parse_header(header: &str) -> Result<(i64, Vec<&str>), BillingError> {
    let mut timestamp: Option<i64> = None;
    let mut candidates = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = value.parse().ok(),
            "v1" => candidates.push(value),
            // v0 and future scheme versions are ignored
            _ => {}
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| BillingError::SignatureInvalid("missing timestamp element".to_string()))?;
    if candidates.is_empty() {
        return Err(BillingError::SignatureInvalid(
            "no v1 signatures in header".to_string(),
        ));
    }

    Ok((timestamp, candidates))
}

/// Byte compare without early exit, so mismatch position does not leak
/// through response timing.
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}
