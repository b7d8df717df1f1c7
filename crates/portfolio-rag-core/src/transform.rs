//! Per-source transformation and classification rules.
//!
//! Every ingested document passes through [`TransformRules::apply_transform`],
//! which looks up the document's source system in a static rule table,
//! optionally masks PII in the content, and produces the
//! [`DocumentMetadata`] that is later copied into each of the document's
//! chunks.
//!
//! # Masking
//!
//! When a source has `pii_mask = true`, four global substitution passes run
//! in a fixed order. Text consumed by an earlier pass is not seen by later
//! ones.
//!
//! | Pass | Token |
//! |------|-------|
//! | email | `[EMAIL_MASKED]` |
//! | phone (`xxx-xxx-xxxx`, `-`/`.` optional) | `[PHONE_MASKED]` |
//! | SSN (`xxx-xx-xxxx`, `-` optional) | `[SSN_MASKED]` |
//! | street address (`<number> <words> Street/St/Avenue/...`) | `[ADDRESS_MASKED]` |
//!
//! # Example
//!
//! ```rust
//! use std::collections::BTreeMap;
//! use portfolio_rag_core::transform::{SourceRule, TransformRules};
//!
//! let mut table = BTreeMap::new();
//! table.insert(
//!     "hr".to_string(),
//!     SourceRule { classification: "CONFIDENTIAL".into(), weight: 1.5, pii_mask: true },
//! );
//! let rules = TransformRules::new(table).unwrap();
//!
//! let (text, meta) = rules.apply_transform("Contact me at a@b.com or 555-123-4567", "hr", "hr/cv.md");
//! assert_eq!(text, "Contact me at [EMAIL_MASKED] or [PHONE_MASKED]");
//! assert_eq!(meta.classification, "CONFIDENTIAL");
//! assert!(meta.pii_masked);
//! ```

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use regex::{NoExpand, Regex};
use serde::{Deserialize, Serialize};

use crate::models::{DocumentMetadata, DEFAULT_CLASSIFICATION, DEFAULT_WEIGHT};

const EMAIL_PATTERN: &str = r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Z|a-z]{2,}\b";
const PHONE_PATTERN: &str = r"\b\d{3}[-.]?\d{3}[-.]?\d{4}\b";
const SSN_PATTERN: &str = r"\b\d{3}-?\d{2}-?\d{4}\b";
const ADDRESS_PATTERN: &str =
    r"(?i)\b\d+\s+[A-Za-z\s]+(?:Street|St|Avenue|Ave|Road|Rd|Drive|Dr|Lane|Ln)\b";

/// Classification and masking settings for one source system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRule {
    #[serde(default = "default_classification")]
    pub classification: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub pii_mask: bool,
}

fn default_classification() -> String {
    DEFAULT_CLASSIFICATION.to_string()
}

fn default_weight() -> f64 {
    DEFAULT_WEIGHT
}

impl Default for SourceRule {
    fn default() -> Self {
        Self {
            classification: default_classification(),
            weight: default_weight(),
            pii_mask: false,
        }
    }
}

/// Compiled PII patterns, applied in declaration order.
#[derive(Debug, Clone)]
struct PiiMasker {
    passes: Vec<(Regex, &'static str)>,
}

impl PiiMasker {
    fn new() -> Result<Self> {
        let specs = [
            (EMAIL_PATTERN, "[EMAIL_MASKED]"),
            (PHONE_PATTERN, "[PHONE_MASKED]"),
            (SSN_PATTERN, "[SSN_MASKED]"),
            (ADDRESS_PATTERN, "[ADDRESS_MASKED]"),
        ];
        let mut passes = Vec::with_capacity(specs.len());
        for (pattern, token) in specs {
            let re = Regex::new(pattern)
                .with_context(|| format!("invalid PII pattern: {}", pattern))?;
            passes.push((re, token));
        }
        Ok(Self { passes })
    }

    fn mask(&self, content: &str) -> String {
        let mut masked = content.to_string();
        for (re, token) in &self.passes {
            masked = re.replace_all(&masked, NoExpand(*token)).into_owned();
        }
        masked
    }
}

/// The static source → rule table plus the compiled masker.
#[derive(Debug, Clone)]
pub struct TransformRules {
    rules: BTreeMap<String, SourceRule>,
    masker: PiiMasker,
}

impl TransformRules {
    /// Build the rule table. Fails only if a PII pattern fails to compile.
    pub fn new(rules: BTreeMap<String, SourceRule>) -> Result<Self> {
        Ok(Self {
            rules,
            masker: PiiMasker::new()?,
        })
    }

    /// Rule for `source_system`, falling back to [`SourceRule::default`].
    pub fn rule_for(&self, source_system: &str) -> SourceRule {
        self.rules.get(source_system).cloned().unwrap_or_default()
    }

    /// Mask (if configured) and classify one piece of content.
    ///
    /// `pii_masked` in the returned metadata mirrors the source's configured
    /// flag, whether or not any PII was found.
    pub fn apply_transform(
        &self,
        content: &str,
        source_system: &str,
        file_path: &str,
    ) -> (String, DocumentMetadata) {
        let rule = self.rule_for(source_system);

        let transformed = if rule.pii_mask {
            self.masker.mask(content)
        } else {
            content.to_string()
        };

        let metadata = DocumentMetadata {
            source_system: source_system.to_string(),
            classification: rule.classification,
            weight: rule.weight,
            file_path: file_path.to_string(),
            pii_masked: rule.pii_mask,
        };

        (transformed, metadata)
    }

    /// Trust weight configured for `source_system` (1.0 when unknown).
    pub fn classification_weight(&self, source_system: &str) -> f64 {
        self.rules
            .get(source_system)
            .map(|r| r.weight)
            .unwrap_or(DEFAULT_WEIGHT)
    }

    /// Mask PII regardless of any source rule.
    pub fn mask_pii(&self, content: &str) -> String {
        self.masker.mask(content)
    }

    /// Configured source names, sorted.
    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> TransformRules {
        let mut table = BTreeMap::new();
        table.insert(
            "hr".to_string(),
            SourceRule {
                classification: "CONFIDENTIAL".to_string(),
                weight: 1.5,
                pii_mask: true,
            },
        );
        table.insert(
            "github".to_string(),
            SourceRule {
                classification: "PUBLIC".to_string(),
                weight: 0.8,
                pii_mask: false,
            },
        );
        TransformRules::new(table).unwrap()
    }

    #[test]
    fn test_masks_email_and_phone() {
        let (text, meta) =
            rules().apply_transform("Contact me at a@b.com or 555-123-4567", "hr", "hr/a.md");
        assert_eq!(text, "Contact me at [EMAIL_MASKED] or [PHONE_MASKED]");
        assert!(meta.pii_masked);
        assert_eq!(meta.file_path, "hr/a.md");
    }

    #[test]
    fn test_masks_ssn_and_address() {
        let r = rules();
        assert_eq!(r.mask_pii("SSN 123-45-6789."), "SSN [SSN_MASKED].");
        assert_eq!(
            r.mask_pii("Lives at 42 Elm street today"),
            "Lives at [ADDRESS_MASKED] today"
        );
        assert_eq!(r.mask_pii("Office: 7 Main AVE"), "Office: [ADDRESS_MASKED]");
    }

    #[test]
    fn test_phone_with_dots_and_no_separator() {
        let r = rules();
        assert_eq!(r.mask_pii("call 555.123.4567"), "call [PHONE_MASKED]");
        assert_eq!(r.mask_pii("call 5551234567"), "call [PHONE_MASKED]");
    }

    #[test]
    fn test_phone_pass_runs_before_ssn() {
        // Nine bare digits fit SSN only; ten bare digits are consumed as a phone.
        let r = rules();
        assert_eq!(r.mask_pii("id 123456789"), "id [SSN_MASKED]");
        assert_eq!(r.mask_pii("id 1234567890"), "id [PHONE_MASKED]");
    }

    #[test]
    fn test_unmasked_source_keeps_content() {
        let input = "Reach me at dev@example.org";
        let (text, meta) = rules().apply_transform(input, "github", "profile_dev");
        assert_eq!(text, input);
        assert!(!meta.pii_masked);
        assert_eq!(meta.weight, 0.8);
    }

    #[test]
    fn test_unknown_source_uses_defaults() {
        let (text, meta) = rules().apply_transform("a@b.com", "upload", "notes.txt");
        assert_eq!(text, "a@b.com");
        assert_eq!(meta.classification, "PUBLIC");
        assert_eq!(meta.weight, 1.0);
        assert!(!meta.pii_masked);
        assert_eq!(meta.source_system, "upload");
    }

    #[test]
    fn test_pii_masked_reflects_flag_not_findings() {
        let (text, meta) = rules().apply_transform("nothing sensitive here", "hr", "x");
        assert_eq!(text, "nothing sensitive here");
        assert!(meta.pii_masked);
    }

    #[test]
    fn test_classification_weight() {
        let r = rules();
        assert_eq!(r.classification_weight("hr"), 1.5);
        assert_eq!(r.classification_weight("nope"), 1.0);
    }

    #[test]
    fn test_source_rule_serde_defaults() {
        let rule: SourceRule = serde_json::from_str(r#"{"weight": 2.0}"#).unwrap();
        assert_eq!(rule.classification, "PUBLIC");
        assert_eq!(rule.weight, 2.0);
        assert!(!rule.pii_mask);
    }
}
