use crate::domain::types::MetricCategory;
use anyhow::{Context, Result};
use regex::Regex;
use std::collections::HashMap;

/// Suffix of internal bookkeeping objects, excluded from every report.
const INTERNAL_SUFFIX: &str = "--ObjectTableIds";

/// Namespace marker of engine-internal entities, excluded when the
/// ignore-internal flag is set.
const INTERNAL_NAMESPACE: &str = "com.tibco.cep.runtime.model";

/// Decides whether a named entity's metrics are included in a report.
///
/// Built once at startup from configuration and shared read-only across
/// all collectors, so `is_included` is safe to call concurrently without
/// locking.
pub struct EntityFilter {
    ignore_internal: bool,
    includes: HashMap<MetricCategory, Vec<Regex>>,
}

impl EntityFilter {
    /// Compile per-category inclusion patterns. A pattern that fails to
    /// compile aborts startup.
    pub fn new(
        ignore_internal: bool,
        patterns: &HashMap<MetricCategory, Vec<String>>,
    ) -> Result<Self> {
        let mut includes = HashMap::new();
        for (category, raw) in patterns {
            let mut compiled = Vec::with_capacity(raw.len());
            for pattern in raw {
                // Anchor so inclusion uses full-match semantics.
                let regex = Regex::new(&format!("^(?:{})$", pattern))
                    .with_context(|| format!("Invalid include pattern '{}'", pattern))?;
                compiled.push(regex);
            }
            includes.insert(*category, compiled);
        }
        Ok(Self {
            ignore_internal,
            includes,
        })
    }

    /// First match wins: static exclusions, then the category's inclusion
    /// set. An absent or empty inclusion set reports everything that
    /// survives the static rules.
    pub fn is_included(&self, name: &str, category: MetricCategory) -> bool {
        if name.ends_with(INTERNAL_SUFFIX) {
            return false;
        }
        if self.ignore_internal && name.contains(INTERNAL_NAMESPACE) {
            return false;
        }

        match self.includes.get(&category) {
            None => true,
            Some(patterns) if patterns.is_empty() => true,
            Some(patterns) => patterns.iter().any(|p| p.is_match(name)),
        }
    }
}
