use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use portal_core::jwks::{JwksOptions, JwksProvider, StaticKeySet, parse_key_set};
use portal_core::jwt::JwtVerifier;
use serde_json::{json, Value};

pub const ISSUER: &str = "https://tenant.example.com/";
pub const KID: &str = "integration-key";

const PRIVATE_KEY: &str = include_str!("../fixtures/rsa_private.pem");
const MODULUS: &str = include_str!("../fixtures/rsa_modulus.txt");

pub fn key_set() -> Value {
    json!({"keys": [
        {"kty": "RSA", "kid": KID, "use": "sig", "alg": "RS256", "n": MODULUS.trim(), "e": "AQAB"}
    ]})
}

pub fn verifier() -> JwtVerifier {
    let set = parse_key_set(&key_set()).expect("fixture key set parses");
    JwtVerifier::new(JwksProvider::new(Box::new(StaticKeySet(set)), JwksOptions::default()), ISSUER)
}

pub fn claims_for(sub: &str) -> Value {
    let now = Utc::now().timestamp();
    json!({"sub": sub, "iss": ISSUER, "iat": now, "exp": now + 600})
}

pub fn sign(claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(KID.to_string());
    let key = EncodingKey::from_rsa_pem(PRIVATE_KEY.as_bytes()).expect("fixture key parses");
    encode(&header, claims, &key).expect("token encodes")
}
