//! Password hashing and credential validation
//!
//! Uses argon2id with default parameters; hashes are PHC strings.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;

use super::AuthError;

const MIN_LOGIN_LEN: usize = 8;
const MIN_PASSWORD_LEN: usize = 8;

/// Hash a password using Argon2id
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Internal(format!("Failed to hash password: {e}")))
}

/// Verify a password against a stored hash
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| AuthError::Internal(format!("Invalid password hash format: {e}")))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// At least 8 ASCII letters or digits
pub fn validate_login(login: &str) -> Result<(), AuthError> {
    if login.len() >= MIN_LOGIN_LEN && login.chars().all(|c| c.is_ascii_alphanumeric()) {
        Ok(())
    } else {
        Err(AuthError::InvalidCredentials(
            "login must be at least 8 letters or digits".into(),
        ))
    }
}

/// At least 8 characters with upper, lower, digit and symbol
pub fn validate_password(password: &str) -> Result<(), AuthError> {
    let long_enough = password.chars().count() >= MIN_PASSWORD_LEN;
    let upper = password.chars().any(|c| c.is_uppercase());
    let lower = password.chars().any(|c| c.is_lowercase());
    let digit = password.chars().any(|c| c.is_ascii_digit());
    let symbol = password
        .chars()
        .any(|c| !c.is_alphanumeric() && !c.is_whitespace());

    if long_enough && upper && lower && digit && symbol {
        Ok(())
    } else {
        Err(AuthError::InvalidCredentials("password too weak".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("Corr3ct-horse").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("Corr3ct-horse", &hash).unwrap());
        assert!(!verify_password("wrong-password", &hash).unwrap());
    }

    #[test]
    fn test_invalid_hash_format() {
        assert!(verify_password("password", "not-a-valid-hash").is_err());
    }

    #[test]
    fn test_login_rules() {
        assert!(validate_login("aliceuser").is_ok());
        assert!(validate_login("Alice2024").is_ok());
        assert!(validate_login("short1").is_err());
        assert!(validate_login("alice.user").is_err());
        assert!(validate_login("alice user").is_err());
    }

    #[test]
    fn test_password_rules() {
        assert!(validate_password("Passw0rd!").is_ok());
        assert!(validate_password("Pw0!").is_err());
        assert!(validate_password("password0!").is_err());
        assert!(validate_password("PASSWORD0!").is_err());
        assert!(validate_password("Password!!").is_err());
        assert!(validate_password("Password00").is_err());
    }
}
