//! Edit input validation
//!
//! Hard failures are returned as validation errors. Allocation shape
//! warnings only go to the job log.

use std::sync::OnceLock;

use regex::Regex;

use crate::allocation::allocation_range_map;
use crate::errors::{ProctorError, ProctorResult};
use crate::job::Job;
use crate::model::{TestDefinition, TestType};
use crate::store::Credentials;

const CONTROL_BUCKET_VALUE: i32 = 0;
const ALLOCATION_DELTA: f64 = 1e-6;

fn matches_identifier(name: &str) -> bool {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new("(?i)^[a-z_][a-z0-9_]*$").ok())
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(name))
}

/// Alphanumeric or underscore, not starting with a digit.
pub fn is_valid_test_name(name: &str) -> bool {
    matches_identifier(name)
}

pub fn is_valid_bucket_name(name: &str) -> bool {
    matches_identifier(name)
}

pub fn validate_credentials(credentials: &Credentials) -> ProctorResult<()> {
    if credentials.is_blank() {
        return Err(ProctorError::validation("No username or password provided"));
    }
    Ok(())
}

pub fn validate_comment(comment: &str) -> ProctorResult<()> {
    if comment.trim().is_empty() {
        return Err(ProctorError::validation("Comment is required."));
    }
    Ok(())
}

pub fn validate_test_name(name: &str) -> ProctorResult<()> {
    if !is_valid_test_name(name) {
        return Err(ProctorError::validation(format!(
            "Test Name must be alpha-numeric underscore and not start with a number, found: '{}'",
            name
        )));
    }
    Ok(())
}

/// Required fields, then bucket and allocation shape.
pub fn validate_basic_information(definition: &TestDefinition, job: &Job) -> ProctorResult<()> {
    if definition.description.trim().is_empty() {
        return Err(ProctorError::validation("Description is required."));
    }
    if definition.salt.trim().is_empty() {
        return Err(ProctorError::validation("Salt is required."));
    }
    let Some(test_type) = definition.test_type else {
        return Err(ProctorError::validation("TestType is required."));
    };
    if definition.buckets.is_empty() {
        return Err(ProctorError::validation("Buckets cannot be empty."));
    }
    if definition.allocations.is_empty() {
        return Err(ProctorError::validation("Allocations cannot be empty."));
    }
    validate_allocations_and_buckets(definition, test_type, job)
}

fn validate_allocations_and_buckets(
    definition: &TestDefinition,
    test_type: TestType,
    job: &Job,
) -> ProctorResult<()> {
    // only the first allocation is inspected for warnings
    if let Some(allocation) = definition.allocations.first() {
        let totals = allocation_range_map(&allocation.ranges);
        let control = totals.get(&CONTROL_BUCKET_VALUE).copied();
        let active = totals.values().filter(|length| **length > 0.0).count();

        match control {
            Some(control) if active > 1 => {
                for (value, total) in &totals {
                    if *value > 0 && *total > 0.0 && (total - control).abs() >= ALLOCATION_DELTA {
                        job.log(format!(
                            "WARNING: Positive bucket total allocation size not same as control bucket total allocation size. \nBucket #{}={}, Zero Bucket={}",
                            value, total, control
                        ));
                    }
                }
            }
            None if active > 1 => {
                job.log("WARNING: You should have a zero bucket (control).");
            }
            _ => {}
        }
    }

    if test_type == TestType::Page && definition.buckets.iter().any(|b| b.value < 0) {
        return Err(ProctorError::validation(
            "PAGE tests cannot contain negative buckets.",
        ));
    }

    if let Some(bucket) = definition
        .buckets
        .iter()
        .find(|b| !is_valid_bucket_name(&b.name))
    {
        return Err(ProctorError::validation(format!(
            "Bucket name must be alpha-numeric underscore and not start with a number, found: '{}'",
            bucket.name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobType;
    use crate::model::{Allocation, Range, TestBucket};

    fn definition() -> TestDefinition {
        TestDefinition {
            test_type: Some(TestType::User),
            salt: "buttons".into(),
            description: "button colours".into(),
            buckets: vec![TestBucket::new("control", 0), TestBucket::new("blue", 1)],
            allocations: vec![Allocation::new(
                None,
                vec![Range::new(0, 0.5), Range::new(1, 0.5)],
            )],
            ..Default::default()
        }
    }

    fn job() -> Job {
        Job::new(1, "edit", JobType::TestEdit)
    }

    #[test]
    fn test_names() {
        assert!(is_valid_test_name("buttons"));
        assert!(is_valid_test_name("_Buttons_2"));
        assert!(!is_valid_test_name("2buttons"));
        assert!(!is_valid_test_name("button-colour"));
        assert!(!is_valid_test_name(""));
        assert!(is_valid_bucket_name("control"));
        assert!(!is_valid_bucket_name("con trol"));
    }

    #[test]
    fn test_valid_definition_has_no_warnings() {
        let job = job();
        validate_basic_information(&definition(), &job).unwrap();
        assert!(job.log_output().is_empty());
    }

    #[test]
    fn test_required_fields() {
        let job = job();
        let mut d = definition();
        d.description = "  ".into();
        assert_eq!(
            validate_basic_information(&d, &job).unwrap_err().to_string(),
            "Description is required."
        );

        let mut d = definition();
        d.test_type = None;
        assert_eq!(
            validate_basic_information(&d, &job).unwrap_err().to_string(),
            "TestType is required."
        );

        let mut d = definition();
        d.allocations.clear();
        assert_eq!(
            validate_basic_information(&d, &job).unwrap_err().to_string(),
            "Allocations cannot be empty."
        );
    }

    #[test]
    fn test_unequal_buckets_warn() {
        let job = job();
        let mut d = definition();
        d.allocations = vec![Allocation::new(
            None,
            vec![Range::new(0, 0.3), Range::new(1, 0.7)],
        )];
        validate_basic_information(&d, &job).unwrap();
        assert!(job
            .log_output()
            .contains("WARNING: Positive bucket total allocation size not same as control"));
    }

    #[test]
    fn test_missing_control_warns() {
        let job = job();
        let mut d = definition();
        d.buckets = vec![TestBucket::new("red", 1), TestBucket::new("blue", 2)];
        d.allocations = vec![Allocation::new(
            None,
            vec![Range::new(1, 0.5), Range::new(2, 0.5)],
        )];
        validate_basic_information(&d, &job).unwrap();
        assert_eq!(
            job.log_output(),
            "WARNING: You should have a zero bucket (control).\n"
        );
    }

    #[test]
    fn test_page_negative_bucket() {
        let job = job();
        let mut d = definition();
        d.test_type = Some(TestType::Page);
        d.buckets.push(TestBucket::new("inactive", -1));
        assert_eq!(
            validate_basic_information(&d, &job).unwrap_err().to_string(),
            "PAGE tests cannot contain negative buckets."
        );
    }

    #[test]
    fn test_bad_bucket_name() {
        let job = job();
        let mut d = definition();
        d.buckets[1].name = "1blue".into();
        assert_eq!(
            validate_basic_information(&d, &job).unwrap_err().to_string(),
            "Bucket name must be alpha-numeric underscore and not start with a number, found: '1blue'"
        );
    }
}
