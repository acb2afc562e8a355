use std::collections::{HashMap, HashSet};

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use lazy_static::lazy_static;
use rand::rngs::OsRng;
use regex::Regex;
use tracing::error;

pub const MIN_LENGTH: usize = 8;
const MAX_SIMILARITY: f64 = 0.7;

lazy_static! {
    static ref COMMON_PASSWORDS: HashSet<&'static str> = include_str!("common_passwords.txt")
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    static ref NON_WORD: Regex = Regex::new(r"\W+").unwrap();
    static ref PADDING: Regex = Regex::new(r"^[\W\d_]*(.*?)[\W\d_]*$").unwrap();
}

pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        anyhow::anyhow!(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

/// Checks a candidate password against every strength rule and returns all
/// violations, empty when the password is acceptable. `email` is the owner's
/// address, used for the similarity rule.
pub fn password_problems(password: &str, email: &str) -> Vec<String> {
    let mut problems = Vec::new();

    if password.chars().count() < MIN_LENGTH {
        problems.push(format!(
            "This password is too short. It must contain at least {MIN_LENGTH} characters."
        ));
    }
    if is_too_similar(password, email) {
        problems.push("The password is too similar to the email address.".to_string());
    }
    if is_common(password) {
        problems.push("This password is too common.".to_string());
    }
    if !password.is_empty() && password.chars().all(|c| c.is_ascii_digit()) {
        problems.push("This password is entirely numeric.".to_string());
    }

    problems
}

/// Listed passwords, and listed words padded with digits or symbols
/// ("Sunshine!2024").
fn is_common(password: &str) -> bool {
    let lowered = password.trim().to_lowercase();
    if COMMON_PASSWORDS.contains(lowered.as_str()) {
        return true;
    }
    PADDING
        .captures(&lowered)
        .and_then(|caps| caps.get(1))
        .map(|base| base.as_str())
        .filter(|base| base.chars().count() >= 4 && base.len() < lowered.len())
        .is_some_and(|base| COMMON_PASSWORDS.contains(base))
}

fn is_too_similar(password: &str, attribute: &str) -> bool {
    if attribute.is_empty() {
        return false;
    }
    let password = password.to_lowercase();
    let value = attribute.to_lowercase();

    NON_WORD
        .split(&value)
        .chain(std::iter::once(value.as_str()))
        .filter(|part| !exceeds_length_ratio(&password, part))
        .any(|part| similarity(&password, part) >= MAX_SIMILARITY)
}

// A short attribute can't meaningfully resemble a much longer password.
fn exceeds_length_ratio(password: &str, part: &str) -> bool {
    let pwd_len = password.chars().count() as f64;
    let part_len = part.chars().count() as f64;
    pwd_len >= 10.0 * part_len && part_len < MAX_SIMILARITY / 2.0 * pwd_len
}

/// Shared-character ratio: 2 * |common multiset| / (|a| + |b|).
fn similarity(a: &str, b: &str) -> f64 {
    let total = a.chars().count() + b.chars().count();
    if total == 0 {
        return 0.0;
    }
    let mut counts: HashMap<char, usize> = HashMap::new();
    for c in b.chars() {
        *counts.entry(c).or_default() += 1;
    }
    let mut matches = 0usize;
    for c in a.chars() {
        if let Some(n) = counts.get_mut(&c) {
            if *n > 0 {
                *n -= 1;
                matches += 1;
            }
        }
    }
    2.0 * matches as f64 / total as f64
}
