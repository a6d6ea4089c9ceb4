//! Deterministic and random resource names.
//!
//! Child resources created by convergence steps are named by hashing their
//! owner and purpose, so a step that runs twice lands on the same object.

use sha2::{Digest, Sha256};
use uuid::Uuid;

pub const THREAD_PREFIX: &str = "t1";
pub const WORKSPACE_PREFIX: &str = "wksp1";
pub const KNOWLEDGE_SET_PREFIX: &str = "kst1";
pub const WORKFLOW_PREFIX: &str = "w1";
pub const TOOL_PREFIX: &str = "tl1";
pub const MCP_SERVER_PREFIX: &str = "ms1";
pub const MCP_SERVER_INSTANCE_PREFIX: &str = "msi1";
pub const PROJECT_MCP_SERVER_PREFIX: &str = "pms1";

const MAX_NAME_LEN: usize = 63;
const TRUNCATED_LEN: usize = 52;
const DIGEST_CHARS: usize = 10;

/// Join `parts` with `-`. Names longer than 63 characters are cut to 52,
/// stripped of trailing dashes and suffixed with a short SHA-256 digest of
/// the full join, so distinct inputs stay distinct.
pub fn safe_hash_concat_name(parts: &[&str]) -> String {
    let name = parts.join("-");
    if name.len() <= MAX_NAME_LEN {
        return name;
    }

    let digest = hex::encode(Sha256::digest(name.as_bytes()));
    let mut cut = TRUNCATED_LEN;
    while !name.is_char_boundary(cut) {
        cut -= 1;
    }
    format!(
        "{}-{}",
        name[..cut].trim_end_matches('-'),
        &digest[..DIGEST_CHARS]
    )
}

/// Random alphanumeric token, 32 characters.
pub fn random_token() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Fresh name with the given prefix, for objects that are not derived from
/// an owner (e.g. a throwaway system thread).
pub fn generate_name(prefix: &str) -> String {
    format!("{prefix}{}", &random_token()[..12])
}

pub fn is_mcp_server_instance_id(id: &str) -> bool {
    id.starts_with(MCP_SERVER_INSTANCE_PREFIX)
}

pub fn is_mcp_server_id(id: &str) -> bool {
    id.starts_with(MCP_SERVER_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_names_are_joined() {
        assert_eq!(
            safe_hash_concat_name(&[WORKSPACE_PREFIX, "t1abc", "shared"]),
            "wksp1-t1abc-shared"
        );
    }

    #[test]
    fn test_long_names_are_truncated_with_digest() {
        let long = "x".repeat(80);
        let a = safe_hash_concat_name(&[TOOL_PREFIX, &long, "t1a"]);
        let b = safe_hash_concat_name(&[TOOL_PREFIX, &long, "t1b"]);

        assert!(a.len() <= TRUNCATED_LEN + 1 + DIGEST_CHARS);
        assert_ne!(a, b);
        assert_eq!(a, safe_hash_concat_name(&[TOOL_PREFIX, &long, "t1a"]));
    }

    #[test]
    fn test_truncation_drops_trailing_dashes() {
        let head = "a".repeat(51);
        let name = safe_hash_concat_name(&[&head, &"b".repeat(40)]);
        assert!(name.starts_with(&format!("{head}-")));
        assert!(!name.contains("--"));
    }

    #[test]
    fn test_mcp_id_prefixes() {
        assert!(is_mcp_server_instance_id("msi1-abc"));
        assert!(!is_mcp_server_id("msi1-abc"));
        assert!(is_mcp_server_id("ms1-abc"));
        assert!(!is_mcp_server_instance_id("ms1-abc"));
    }

    #[test]
    fn test_random_token_shape() {
        let token = random_token();
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
        assert!(generate_name(THREAD_PREFIX).starts_with(THREAD_PREFIX));
    }
}
