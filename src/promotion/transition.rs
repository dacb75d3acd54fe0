//! Promotion transitions
//!
//! Exactly three environment pairs may be promoted: trunk to qa, trunk to
//! production and qa to production. Every other ordered pair, including an
//! environment to itself, is rejected before any store is touched.

use std::fmt;

use super::errors::{PromotionError, PromotionResult};
use super::promoter::Promoter;
use crate::errors::ProctorResult;
use crate::job::Job;
use crate::model::{short_revision, Environment};
use crate::store::{Credentials, Metadata};

/// A legal promotion edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    WorkingToQa,
    WorkingToProduction,
    QaToProduction,
}

impl Transition {
    /// Every legal transition.
    pub const ALL: [Transition; 3] = [
        Self::WorkingToQa,
        Self::WorkingToProduction,
        Self::QaToProduction,
    ];

    /// Resolve the transition from `source` to `destination`.
    pub fn between(source: Environment, destination: Environment) -> PromotionResult<Self> {
        match (source, destination) {
            (Environment::Working, Environment::Qa) => Ok(Self::WorkingToQa),
            (Environment::Working, Environment::Production) => Ok(Self::WorkingToProduction),
            (Environment::Qa, Environment::Production) => Ok(Self::QaToProduction),
            _ => Err(PromotionError::forbidden_transition(source, destination)),
        }
    }

    pub fn source(&self) -> Environment {
        match self {
            Self::WorkingToQa | Self::WorkingToProduction => Environment::Working,
            Self::QaToProduction => Environment::Qa,
        }
    }

    pub fn destination(&self) -> Environment {
        match self {
            Self::WorkingToQa => Environment::Qa,
            Self::WorkingToProduction | Self::QaToProduction => Environment::Production,
        }
    }

    /// Bind this transition to the promoter that performs it.
    pub fn action<'a>(&self, promoter: &'a dyn Promoter) -> PromoteAction<'a> {
        PromoteAction {
            transition: *self,
            promoter,
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let description = match self {
            Self::WorkingToQa => "trunk to qa",
            Self::WorkingToProduction => "trunk to production",
            Self::QaToProduction => "qa to production",
        };
        f.write_str(description)
    }
}

/// A transition bound to its promoter.
pub struct PromoteAction<'a> {
    transition: Transition,
    promoter: &'a dyn Promoter,
}

impl PromoteAction<'_> {
    /// Log the store-level promotion and delegate it to the promoter.
    pub fn promote_test(
        &self,
        job: &Job,
        test_name: &str,
        src_revision: &str,
        dest_revision: &str,
        credentials: &Credentials,
        metadata: &Metadata,
    ) -> ProctorResult<()> {
        job.log(format!(
            "(scm) promote {} {} ({})",
            test_name,
            short_revision(src_revision),
            self.transition
        ));
        self.promoter.promote(
            self.transition,
            test_name,
            src_revision,
            dest_revision,
            credentials,
            metadata,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::promotion::PromotionErrorKind;

    #[test]
    fn test_legal_transitions() {
        for transition in Transition::ALL {
            assert_eq!(
                Transition::between(transition.source(), transition.destination()).unwrap(),
                transition
            );
        }
    }

    #[test]
    fn test_illegal_transitions() {
        for source in Environment::ALL {
            for destination in Environment::ALL {
                let legal = Transition::ALL
                    .iter()
                    .any(|t| t.source() == source && t.destination() == destination);
                let result = Transition::between(source, destination);
                assert_eq!(result.is_ok(), legal, "{} -> {}", source, destination);
                if let Err(e) = result {
                    assert_eq!(e.kind, PromotionErrorKind::ForbiddenTransition);
                    assert!(e.message.contains(source.name()));
                    assert!(e.message.contains(destination.name()));
                }
            }
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(Transition::WorkingToQa.to_string(), "trunk to qa");
        assert_eq!(Transition::QaToProduction.to_string(), "qa to production");
    }
}
