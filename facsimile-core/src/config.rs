use serde::{Deserialize, Serialize};

/// How a clone reports values it had to replace with zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Policy {
    /// Degrade silently and always return a result.
    #[default]
    Lenient,
    /// Still degrade, but fail the call with the first degradation.
    Strict,
}

/// Options for a clone operation.
///
/// Deserializable so that host applications can keep them in their own
/// configuration files, e.g. a `[clone]` table with `policy = "strict"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloneOptions {
    #[serde(default)]
    pub policy: Policy,
}

impl CloneOptions {
    pub fn lenient() -> Self {
        CloneOptions {
            policy: Policy::Lenient,
        }
    }

    pub fn strict() -> Self {
        CloneOptions {
            policy: Policy::Strict,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_lenient() {
        assert_eq!(CloneOptions::default().policy, Policy::Lenient);
    }

    #[test]
    fn deserializes_from_config() {
        let options: CloneOptions = serde_json::from_str(r#"{"policy":"strict"}"#).unwrap();
        assert_eq!(options, CloneOptions::strict());

        let options: CloneOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, CloneOptions::lenient());
    }

    #[test]
    fn serializes_lowercase() {
        let json = serde_json::to_string(&CloneOptions::strict()).unwrap();
        assert_eq!(json, r#"{"policy":"strict"}"#);
    }
}
