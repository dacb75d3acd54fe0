//! Per-client verification
//!
//! Checks a test matrix against the tests one client requires. A verifier
//! reports tests that are missing or invalid in a [`LoadResult`]; it only
//! returns `Err` when the client's own specification cannot be used.

use std::collections::{BTreeMap, BTreeSet};

use crate::errors::{ProctorError, ProctorResult};
use crate::matrix::TestMatrixArtifact;
use crate::model::{Payload, TestDefinition};

use super::TestSpecification;

/// Tolerance when checking that allocation ranges sum to one.
const ALLOCATION_DELTA: f64 = 1e-6;

/// Outcome of verifying a matrix for one client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadResult {
    /// Test name to incompatibility message
    pub invalid: BTreeMap<String, String>,
    /// Required tests absent from the matrix
    pub missing: BTreeSet<String>,
}

impl LoadResult {
    pub fn has_invalid_tests(&self) -> bool {
        !self.invalid.is_empty() || !self.missing.is_empty()
    }
}

/// Verifies a matrix against the requirements of a single client.
pub trait ClientVerifier: Send + Sync {
    fn verify(
        &self,
        artifact: &TestMatrixArtifact,
        matrix_source: &str,
        required: &BTreeMap<String, TestSpecification>,
    ) -> ProctorResult<LoadResult>;
}

/// Default verifier applying bucket, allocation and payload rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpecificationVerifier;

impl ClientVerifier for SpecificationVerifier {
    fn verify(
        &self,
        artifact: &TestMatrixArtifact,
        matrix_source: &str,
        required: &BTreeMap<String, TestSpecification>,
    ) -> ProctorResult<LoadResult> {
        let mut result = LoadResult::default();
        for (test_name, spec) in required {
            check_specification(test_name, spec)?;

            let Some(definition) = artifact.tests.get(test_name) else {
                result.missing.insert(test_name.clone());
                continue;
            };

            if let Err(message) = check_against_specification(test_name, matrix_source, definition, spec) {
                result.invalid.insert(test_name.clone(), message);
            }
        }
        Ok(result)
    }
}

/// A client specification must name buckets and a known payload type.
fn check_specification(test_name: &str, spec: &TestSpecification) -> ProctorResult<()> {
    if spec.buckets.is_empty() {
        return Err(ProctorError::validation(format!(
            "Specification for '{}' declares no buckets",
            test_name
        )));
    }
    if let Some(payload) = &spec.payload {
        if !Payload::is_known_type(&payload.payload_type) {
            return Err(ProctorError::validation(format!(
                "Specification for '{}' has unknown payload type '{}'",
                test_name, payload.payload_type
            )));
        }
    }
    Ok(())
}

fn check_against_specification(
    test_name: &str,
    matrix_source: &str,
    definition: &TestDefinition,
    spec: &TestSpecification,
) -> Result<(), String> {
    check_internal_consistency(test_name, definition).map_err(|e| format!("{}: {}", matrix_source, e))?;

    for allocation in &definition.allocations {
        for range in allocation.ranges.iter().filter(|r| r.length > 0.0) {
            if !spec.knows_value(range.bucket_value) {
                return Err(format!(
                    "{}: allocation range in {} refers to bucket value {} unknown to the client",
                    matrix_source, test_name, range.bucket_value
                ));
            }
        }
    }

    if let Some(required) = &spec.payload {
        for bucket in &definition.buckets {
            match &bucket.payload {
                None => {
                    return Err(format!(
                        "{}: bucket '{}' of {} has no payload, expected {}",
                        matrix_source, bucket.name, test_name, required.payload_type
                    ));
                }
                Some(payload) if payload.payload_type() != required.payload_type => {
                    return Err(format!(
                        "{}: bucket '{}' of {} has payload type {}, expected {}",
                        matrix_source,
                        bucket.name,
                        test_name,
                        payload.payload_type(),
                        required.payload_type
                    ));
                }
                Some(_) => {}
            }
        }
    }
    Ok(())
}

/// Check that a definition is consistent with itself.
///
/// Bucket names must be unique, every range must reference a declared bucket
/// with a non-negative length, and each allocation must sum to one.
pub fn check_internal_consistency(test_name: &str, definition: &TestDefinition) -> ProctorResult<()> {
    let mut names = BTreeSet::new();
    for bucket in &definition.buckets {
        if !names.insert(bucket.name.as_str()) {
            return Err(ProctorError::validation(format!(
                "Duplicate bucket name '{}' in {}",
                bucket.name, test_name
            )));
        }
    }

    for allocation in &definition.allocations {
        if allocation.ranges.is_empty() {
            if definition.buckets.is_empty() {
                continue;
            }
            return Err(ProctorError::validation(format!(
                "No ranges in an allocation of {}",
                test_name
            )));
        }
        for range in &allocation.ranges {
            if range.length < 0.0 {
                return Err(ProctorError::validation(format!(
                    "Allocation range in {} has negative length {}",
                    test_name, range.length
                )));
            }
            if definition.bucket_by_value(range.bucket_value).is_none() {
                return Err(ProctorError::validation(format!(
                    "Allocation range in {} refers to unknown bucket value {}",
                    test_name, range.bucket_value
                )));
            }
        }
        let total = allocation.total_length();
        if (total - 1.0).abs() >= ALLOCATION_DELTA {
            return Err(ProctorError::validation(format!(
                "Allocation ranges in {} add up to {}, expected 1",
                test_name, total
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::TestMatrixArtifact;
    use crate::model::{Allocation, Range, TestBucket};
    use crate::specification::PayloadSpecification;

    fn definition() -> TestDefinition {
        TestDefinition {
            salt: "buttons".into(),
            buckets: vec![
                TestBucket::new("inactive", -1),
                TestBucket::new("control", 0),
                TestBucket::new("test", 1),
            ],
            allocations: vec![Allocation::new(
                None,
                vec![Range::new(-1, 0.0), Range::new(0, 0.5), Range::new(1, 0.5)],
            )],
            ..Default::default()
        }
    }

    fn spec() -> TestSpecification {
        TestSpecification {
            buckets: BTreeMap::from([("control".to_string(), 0), ("test".to_string(), 1)]),
            fallback_value: -1,
            payload: None,
        }
    }

    fn required(spec: TestSpecification) -> BTreeMap<String, TestSpecification> {
        BTreeMap::from([("buttons".to_string(), spec)])
    }

    #[test]
    fn test_compatible_definition() {
        let artifact = TestMatrixArtifact::for_candidate("buttons", Some(&definition()));
        let result = SpecificationVerifier
            .verify(&artifact, "search@1", &required(spec()))
            .unwrap();
        assert!(!result.has_invalid_tests());
    }

    #[test]
    fn test_missing_test() {
        let artifact = TestMatrixArtifact::for_candidate("buttons", None);
        let result = SpecificationVerifier
            .verify(&artifact, "search@1", &required(spec()))
            .unwrap();
        assert!(result.missing.contains("buttons"));
        assert!(result.has_invalid_tests());
    }

    #[test]
    fn test_unknown_active_bucket_is_invalid() {
        let mut spec = spec();
        spec.buckets.remove("test");
        let artifact = TestMatrixArtifact::for_candidate("buttons", Some(&definition()));
        let result = SpecificationVerifier
            .verify(&artifact, "search@1", &required(spec))
            .unwrap();
        assert!(result.invalid["buttons"].contains("bucket value 1"));
    }

    #[test]
    fn test_payload_mismatch_is_invalid() {
        let mut spec = spec();
        spec.payload = Some(PayloadSpecification {
            payload_type: "stringValue".into(),
        });
        let artifact = TestMatrixArtifact::for_candidate("buttons", Some(&definition()));
        let result = SpecificationVerifier
            .verify(&artifact, "search@1", &required(spec))
            .unwrap();
        assert!(result.invalid["buttons"].contains("has no payload"));
    }

    #[test]
    fn test_malformed_specification_errors() {
        let mut spec = spec();
        spec.payload = Some(PayloadSpecification {
            payload_type: "booleanValue".into(),
        });
        let artifact = TestMatrixArtifact::for_candidate("buttons", Some(&definition()));
        assert!(SpecificationVerifier
            .verify(&artifact, "search@1", &required(spec))
            .is_err());

        let empty = TestSpecification::default();
        assert!(SpecificationVerifier
            .verify(&artifact, "search@1", &required(empty))
            .is_err());
    }

    #[test]
    fn test_internal_consistency() {
        assert!(check_internal_consistency("buttons", &definition()).is_ok());

        let mut bad_sum = definition();
        bad_sum.allocations[0].ranges[1].length = 0.4;
        assert!(check_internal_consistency("buttons", &bad_sum).is_err());

        let mut unknown = definition();
        unknown.allocations[0].ranges.push(Range::new(7, 0.0));
        let err = check_internal_consistency("buttons", &unknown).unwrap_err();
        assert!(err.to_string().contains("unknown bucket value 7"));

        let mut duplicate = definition();
        duplicate.buckets.push(TestBucket::new("test", 2));
        assert!(check_internal_consistency("buttons", &duplicate).is_err());
    }
}
