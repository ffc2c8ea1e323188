//! TOTP code verification for the MFA challenge step.
//!
//! Secrets are stored base32-encoded on the user row; enrollment and secret
//! distribution are handled elsewhere. Codes are the standard 6-digit,
//! 30-second SHA-1 variant with a one-step skew allowance.

use anyhow::{anyhow, Result};
use totp_rs::{Algorithm, Secret, TOTP};

const DIGITS: usize = 6;
const SKEW: u8 = 1;
const STEP_SECONDS: u64 = 30;

/// Check a one-time code against a stored base32 secret.
///
/// # Errors
/// Returns an error for an undecodable secret or an unusable system clock;
/// a wrong code is `Ok(false)`, not an error.
pub fn verify_code(secret_base32: &str, code: &str) -> Result<bool> {
    let secret = Secret::Encoded(secret_base32.trim().to_string())
        .to_bytes()
        .map_err(|err| anyhow!("invalid TOTP secret: {err:?}"))?;

    let totp = TOTP::new(Algorithm::SHA1, DIGITS, SKEW, STEP_SECONDS, secret)
        .map_err(|err| anyhow!("invalid TOTP parameters: {err}"))?;

    totp.check_current(code.trim())
        .map_err(|err| anyhow!("system clock error: {err}"))
}

#[cfg(test)]
mod tests {
    use super::{verify_code, DIGITS, SKEW, STEP_SECONDS};
    use anyhow::Result;
    use totp_rs::{Algorithm, Secret, TOTP};

    // RFC 6238 test secret, base32-encoded.
    const SECRET_BASE32: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";

    #[test]
    fn accepts_the_current_code() -> Result<()> {
        let secret = Secret::Encoded(SECRET_BASE32.to_string())
            .to_bytes()
            .expect("secret");
        let totp = TOTP::new(Algorithm::SHA1, DIGITS, SKEW, STEP_SECONDS, secret).expect("totp");
        let code = totp.generate_current()?;

        assert!(verify_code(SECRET_BASE32, &code)?);
        Ok(())
    }

    #[test]
    fn rejects_a_tampered_code() -> Result<()> {
        let secret = Secret::Encoded(SECRET_BASE32.to_string())
            .to_bytes()
            .expect("secret");
        let totp = TOTP::new(Algorithm::SHA1, DIGITS, SKEW, STEP_SECONDS, secret).expect("totp");
        let code = totp.generate_current()?;

        // Flip the last digit so the token is guaranteed to differ.
        let mut tampered: Vec<u8> = code.into_bytes();
        if let Some(last) = tampered.last_mut() {
            *last = if *last == b'0' { b'1' } else { b'0' };
        }
        let tampered = String::from_utf8(tampered)?;

        assert!(!verify_code(SECRET_BASE32, &tampered)?);
        Ok(())
    }

    #[test]
    fn rejects_an_undecodable_secret() {
        assert!(verify_code("not-base32-!!!", "123456").is_err());
    }
}
