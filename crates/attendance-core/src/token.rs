use base64::{
    engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD},
    Engine,
};

use crate::error::AccessError;
use crate::models::IdentitySubject;

/// Read the subject claims out of an identity token.
///
/// The signature is NOT checked. The token was already accepted by the
/// identity provider and the backend re-validates it; here it only names
/// who is signed in.
pub fn decode_identity_subject(id_token: &str) -> Result<IdentitySubject, AccessError> {
    let mut segments = id_token.trim().split('.');
    let (Some(_header), Some(payload)) = (segments.next(), segments.next()) else {
        return Err(AccessError::MalformedToken(
            "expected '.'-delimited segments".to_string(),
        ));
    };

    let bytes = decode_segment(payload)?;
    let subject: IdentitySubject = serde_json::from_slice(&bytes)
        .map_err(|e| AccessError::MalformedToken(format!("payload is not valid claims JSON: {e}")))?;

    if subject.sub.is_empty() {
        return Err(AccessError::MalformedToken("empty 'sub' claim".to_string()));
    }

    Ok(subject)
}

/// Token segments are base64url without padding, but be lenient the way
/// browser `atob` callers tend to be.
fn decode_segment(segment: &str) -> Result<Vec<u8>, AccessError> {
    if segment.is_empty() {
        return Err(AccessError::MalformedToken("empty payload segment".to_string()));
    }

    for engine in [&URL_SAFE_NO_PAD, &URL_SAFE, &STANDARD, &STANDARD_NO_PAD] {
        if let Ok(bytes) = engine.decode(segment) {
            return Ok(bytes);
        }
    }

    Err(AccessError::MalformedToken(
        "payload segment is not base64/base64url".to_string(),
    ))
}

#[cfg(test)]
pub(crate) fn mint_id_token(sub: &str, email: Option<&str>) -> String {
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    let claims = match email {
        Some(email) => json!({ "sub": sub, "email": email, "token_use": "id" }),
        None => json!({ "sub": sub, "token_use": "id" }),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(b"test-only"),
    )
    .unwrap()
}
