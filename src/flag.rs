//! Per-instance flag generation.
//!
//! Every flag embeds 128 bits of fresh CSPRNG entropy, so repeated calls
//! for the same instance are pairwise-distinct. Templates use `${...}`
//! placeholders; see [`DEFAULT_TEMPLATE`] for the available variables.

use crate::error::Result;
use crate::template;
use minijinja::context;
use rand::Rng;

/// Used when a Challenge does not carry its own flag template.
/// Variables: `${instance_id}`, `${source_id}`, `${challenge_id}`, `${random}`.
pub const DEFAULT_TEMPLATE: &str = "FLAG{${challenge_id}_${source_id}_${random}}";

/// 32 hex chars = 128 bits of entropy
const RANDOM_HEX_LEN: usize = 32;

/// Generate one flag. `template` of `None` selects [`DEFAULT_TEMPLATE`];
/// malformed templates fail loudly rather than yielding a wrong flag.
pub fn generate(
    template: Option<&str>,
    instance_id: &str,
    source_id: &str,
    challenge_id: &str,
) -> Result<String> {
    let random = random_hex(RANDOM_HEX_LEN);
    template::render(
        template.unwrap_or(DEFAULT_TEMPLATE),
        context! {
            instance_id => instance_id,
            source_id => source_id,
            challenge_id => challenge_id,
            random => random,
        },
    )
}

/// Generate `count` flags, each with fresh randomness.
pub fn generate_many(
    template: Option<&str>,
    instance_id: &str,
    source_id: &str,
    challenge_id: &str,
    count: usize,
) -> Result<Vec<String>> {
    (0..count.max(1))
        .map(|_| generate(template, instance_id, source_id, challenge_id))
        .collect()
}

fn random_hex(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len).map(|_| format!("{:x}", rng.gen_range(0..16))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_default_template_shape() {
        let flag = generate(None, "instance-1", "user-123", "challenge-1").unwrap();
        assert!(flag.starts_with("FLAG{challenge-1_user-123_"), "got: {}", flag);
        assert!(flag.ends_with('}'));
    }

    #[test]
    fn test_custom_template() {
        let flag = generate(
            Some("CTF{${source_id}_${random}}"),
            "instance-1",
            "team-42",
            "chall-5",
        )
        .unwrap();
        assert!(flag.starts_with("CTF{team-42_"), "got: {}", flag);
    }

    #[test]
    fn test_all_variables() {
        let flag = generate(
            Some("${instance_id}-${source_id}-${challenge_id}-${random}"),
            "inst-1",
            "src-2",
            "chall-3",
        )
        .unwrap();
        assert!(flag.starts_with("inst-1-src-2-chall-3-"));

        let random = flag.rsplit('-').next().unwrap();
        assert_eq!(random.len(), 32);
        assert!(random.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_flags_are_unique() {
        let mut seen = HashSet::new();
        for _ in 0..100 {
            let flag = generate(None, "instance-1", "user-123", "challenge-1").unwrap();
            assert!(seen.insert(flag), "duplicate flag generated");
        }
    }

    #[test]
    fn test_invalid_template_fails() {
        assert!(generate(Some("${unterminated"), "i", "s", "c").is_err());
        assert!(generate(Some("${no_such_variable}"), "i", "s", "c").is_err());
    }

    #[test]
    fn test_generate_many() {
        let flags = generate_many(None, "instance-1", "user-123", "challenge-1", 5).unwrap();
        assert_eq!(flags.len(), 5);
        let unique: HashSet<_> = flags.iter().collect();
        assert_eq!(unique.len(), 5);
    }

    #[test]
    fn test_generate_many_zero_count() {
        let flags = generate_many(None, "instance-1", "user-123", "challenge-1", 0).unwrap();
        assert_eq!(flags.len(), 1);
    }
}
