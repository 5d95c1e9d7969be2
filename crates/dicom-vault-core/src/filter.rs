use crate::dicom::RawDescriptor;
use crate::storage::models::FilterRule;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    SliceThicknessExceeded { thickness: f64, max: f64 },
    TooFewImages { count: usize, min: i64 },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::SliceThicknessExceeded { thickness, max } => {
                write!(f, "slice thickness {} exceeds {}", thickness, max)
            }
            RejectReason::TooFewImages { count, min } => {
                write!(f, "{} images, fewer than the required {}", count, min)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterDecision {
    Accept,
    Reject(RejectReason),
}

impl FilterDecision {
    pub fn is_accept(&self) -> bool {
        matches!(self, FilterDecision::Accept)
    }
}

/// Admission policy for new series, built from a snapshot of the active rules
/// at the start of a scan.
#[derive(Debug, Clone, Default)]
pub struct FilterPolicy {
    rules: HashMap<String, FilterRule>,
    enforce_min_image_count: bool,
}

impl FilterPolicy {
    /// Inactive rules are ignored; the first active rule per modality wins.
    pub fn new(rules: Vec<FilterRule>, enforce_min_image_count: bool) -> Self {
        let mut by_modality = HashMap::new();
        for rule in rules.into_iter().filter(|r| r.is_active) {
            by_modality.entry(rule.modality.clone()).or_insert(rule);
        }
        Self {
            rules: by_modality,
            enforce_min_image_count,
        }
    }

    pub fn rule_for(&self, modality: &str) -> Option<&FilterRule> {
        self.rules.get(modality)
    }

    /// `group_size` is the number of files grouped under the series, not the
    /// single sampled file. Values that cannot be evaluated accept.
    pub fn evaluate(&self, descriptor: &RawDescriptor, group_size: usize) -> FilterDecision {
        let Some(rule) = self.rule_for(&descriptor.modality) else {
            return FilterDecision::Accept;
        };

        if let (Some(max), Some(thickness)) =
            (rule.max_slice_thickness, descriptor.slice_thickness())
        {
            if thickness > max {
                return FilterDecision::Reject(RejectReason::SliceThicknessExceeded {
                    thickness,
                    max,
                });
            }
        }

        if self.enforce_min_image_count {
            if let Some(min) = rule.min_image_count {
                if (group_size as i64) < min {
                    return FilterDecision::Reject(RejectReason::TooFewImages {
                        count: group_size,
                        min,
                    });
                }
            }
        }

        FilterDecision::Accept
    }
}
