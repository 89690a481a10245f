//! Password generation and `mysql_native_password` hashing

use rand::Rng;
use rand::seq::SliceRandom;
use sha1::{Digest, Sha1};

use crate::SecretString;

const LOWERCASE: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const UPPERCASE: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &[u8] = b"0123456789";
const SPECIAL: &[u8] = b"~@#$^&*()-=+]}[{|;:.>,</?";

/// Generate a random password of `length` characters
///
/// Every password contains at least one lower-case letter, upper-case
/// letter, digit and special character, so it passes the common password
/// validation policies when `length` is at least the policy's minimum.
pub fn generate(length: usize) -> SecretString {
    let classes = [LOWERCASE, UPPERCASE, DIGITS, SPECIAL];
    let mut rng = rand::rng();

    let mut chars: Vec<u8> = classes
        .iter()
        .map(|class| class[rng.random_range(0..class.len())])
        .collect();
    let all: Vec<u8> = classes.concat();
    while chars.len() < length {
        chars.push(all[rng.random_range(0..all.len())]);
    }
    chars.shuffle(&mut rng);

    SecretString::new(chars.into_iter().map(char::from).collect::<String>())
}

/// `mysql_native_password` hash: `*` followed by upper-case hex of `SHA1(SHA1(password))`
pub fn native_password_hash(password: &SecretString) -> String {
    let stage1 = password.expose_secret(|p| Sha1::digest(p.as_bytes()));
    let stage2 = Sha1::digest(stage1);
    format!("*{}", hex::encode_upper(stage2))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_native_hash() {
        assert_eq!(
            native_password_hash(&SecretString::new("secret")),
            "*14E65567ABDB5135D0CFD9A70B3032C179A49EE7"
        );
    }

    #[test]
    fn test_generated_password_has_every_class() {
        for _ in 0..50 {
            let password = generate(8);
            assert_eq!(password.len(), 8);
            password.expose_secret(|p| {
                assert!(p.bytes().any(|b| LOWERCASE.contains(&b)));
                assert!(p.bytes().any(|b| UPPERCASE.contains(&b)));
                assert!(p.bytes().any(|b| DIGITS.contains(&b)));
                assert!(p.bytes().any(|b| SPECIAL.contains(&b)));
            });
        }
    }

    #[test]
    fn test_generated_passwords_differ() {
        assert_ne!(generate(32), generate(32));
    }
}
