//! Armored credential text: a certificate block followed by a signing key
//! block.

use ghostkey_core::armor;
use ghostkey_core::{GhostkeyCertificate, SigningKeyBytes};

use crate::error::{VaultError, VaultResult};

#[derive(Debug, Clone)]
pub struct ParsedCredential {
    pub certificate: GhostkeyCertificate,
    pub signing_key: SigningKeyBytes,
}

/// Parse both blocks out of `text`. Each block is located by its delimiters.
///
/// Fails with `MalformedCredential` if either block is missing or
/// undecodable, or if the signing key does not belong to the certificate.
pub fn parse_armored(text: &str) -> VaultResult<ParsedCredential> {
    for label in [armor::CERTIFICATE_LABEL, armor::SIGNING_KEY_LABEL] {
        if !armor::contains_block(text, label) {
            return Err(VaultError::MalformedCredential(format!(
                "missing {} block",
                label
            )));
        }
    }

    let certificate = GhostkeyCertificate::from_armored(text)
        .map_err(|e| VaultError::MalformedCredential(e.to_string()))?;
    let signing_key = SigningKeyBytes::from_armored(text)
        .map_err(|e| VaultError::MalformedCredential(e.to_string()))?;

    if signing_key.verifying_key_bytes() != certificate.ghostkey_verifying_key {
        return Err(VaultError::MalformedCredential(
            "signing key does not match certificate".into(),
        ));
    }

    Ok(ParsedCredential {
        certificate,
        signing_key,
    })
}

pub fn to_armored(certificate: &GhostkeyCertificate, signing_key: &SigningKeyBytes) -> VaultResult<String> {
    let cert = certificate
        .to_armored()
        .map_err(|e| VaultError::Serialization(e.to_string()))?;
    Ok(join_blocks(&cert, &signing_key.to_armored()))
}

pub(crate) fn join_blocks(certificate_block: &str, signing_key_block: &str) -> String {
    format!(
        "{}\n{}",
        certificate_block.trim_end(),
        signing_key_block
    )
}
