use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{TimeZone, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::debug;
use uuid::Uuid;

use shared_models::auth::{AuthUser, JwtClaims};

type HmacSha256 = Hmac<Sha256>;

pub fn validate_token(token: &str, jwt_secret: &str) -> Result<AuthUser, String> {
    if jwt_secret.is_empty() {
        return Err("JWT secret is not set".to_string());
    }

    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err("Invalid token format".to_string());
    }

    let header_b64 = parts[0];
    let claims_b64 = parts[1];
    let signature_b64 = parts[2];

    let signature = match URL_SAFE_NO_PAD.decode(signature_b64) {
        Ok(sig) => sig,
        Err(e) => {
            debug!("Failed to decode signature: {}", e);
            return Err("Invalid signature encoding".to_string());
        }
    };

    let signature_string = format!("{}.{}", header_b64, claims_b64);

    let mut mac = match HmacSha256::new_from_slice(jwt_secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return Err("Failed to create HMAC".to_string()),
    };

    mac.update(signature_string.as_bytes());

    if mac.verify_slice(&signature).is_err() {
        debug!("Token signature verification failed");
        return Err("Invalid token signature".to_string());
    }

    let claims_json = match URL_SAFE_NO_PAD.decode(claims_b64) {
        Ok(bytes) => match String::from_utf8(bytes) {
            Ok(json_str) => json_str,
            Err(_) => return Err("Invalid claims encoding".to_string()),
        },
        Err(_) => return Err("Invalid claims encoding".to_string()),
    };

    let claims: JwtClaims = match serde_json::from_str(&claims_json) {
        Ok(c) => c,
        Err(e) => {
            debug!("Failed to parse claims: {}", e);
            return Err("Invalid claims format".to_string());
        }
    };

    if let Some(exp) = claims.exp {
        let now = Utc::now().timestamp() as u64;
        if exp < now {
            debug!("Token expired at {} (now: {})", exp, now);
            return Err("Token expired".to_string());
        }
    }

    let id = Uuid::parse_str(&claims.sub).map_err(|_| "Invalid subject id".to_string())?;

    let created_at = claims
        .iat
        .and_then(|timestamp| Utc.timestamp_opt(timestamp as i64, 0).single());

    let user = AuthUser {
        id,
        role: claims.role,
        specialty: claims.specialty,
        email: claims.email,
        created_at,
    };

    debug!("Token validated successfully for user: {}", user.id);
    Ok(user)
}

/// Mint a token with the given secret. Test scaffolding for the auth seam;
/// credential issuance itself belongs to the auth collaborator.
pub fn issue_token(user: &AuthUser, jwt_secret: &str, ttl_seconds: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
    let now = Utc::now().timestamp();
    let claims = serde_json::json!({
        "sub": user.id.to_string(),
        "exp": (now + ttl_seconds) as u64,
        "iat": now as u64,
        "email": user.email,
        "role": user.role,
        "specialty": user.specialty,
    });
    let claims_b64 = URL_SAFE_NO_PAD.encode(claims.to_string());
    let signing_input = format!("{}.{}", header, claims_b64);

    let mut mac = HmacSha256::new_from_slice(jwt_secret.as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(signing_input.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    format!("{}.{}", signing_input, signature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_models::auth::Role;
    use shared_models::consultation::Specialty;

    fn professional() -> AuthUser {
        AuthUser {
            id: Uuid::new_v4(),
            role: Role::Professional,
            specialty: Some(Specialty::Cardiology),
            email: Some("pro@example.com".to_string()),
            created_at: None,
        }
    }

    #[test]
    fn round_trips_claims() {
        let user = professional();
        let token = issue_token(&user, "secret-key", 3600);
        let validated = validate_token(&token, "secret-key").expect("valid token");
        assert_eq!(validated.id, user.id);
        assert_eq!(validated.role, Role::Professional);
        assert_eq!(validated.specialty, Some(Specialty::Cardiology));
    }

    #[test]
    fn rejects_wrong_secret() {
        let token = issue_token(&professional(), "secret-key", 3600);
        assert!(validate_token(&token, "other-key").is_err());
    }

    #[test]
    fn rejects_expired_token() {
        let token = issue_token(&professional(), "secret-key", -60);
        assert!(validate_token(&token, "secret-key").is_err());
    }

    #[test]
    fn rejects_garbage() {
        assert!(validate_token("not-a-token", "secret-key").is_err());
    }
}
