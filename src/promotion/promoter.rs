//! Store-level promotion
//!
//! A [`Promoter`] copies a definition from the source store into the
//! destination store. The destination revision is checked optimistically:
//! concurrent promotions are caught here, not by the state machine.

use tracing::info;

use super::errors::PromotionError;
use super::transition::Transition;
use crate::errors::ProctorResult;
use crate::model::{short_revision, UNKNOWN_REVISION};
use crate::store::{Credentials, Metadata, StoreSet};

/// Applies a promotion to the destination store.
pub trait Promoter: Send + Sync {
    fn promote(
        &self,
        transition: Transition,
        test_name: &str,
        src_revision: &str,
        dest_revision: &str,
        credentials: &Credentials,
        metadata: &Metadata,
    ) -> ProctorResult<()>;
}

/// Promoter copying definitions between the stores of a [`StoreSet`].
#[derive(Debug, Clone)]
pub struct StorePromoter {
    stores: StoreSet,
}

impl StorePromoter {
    pub fn new(stores: StoreSet) -> Self {
        Self { stores }
    }
}

impl Promoter for StorePromoter {
    fn promote(
        &self,
        transition: Transition,
        test_name: &str,
        src_revision: &str,
        dest_revision: &str,
        credentials: &Credentials,
        metadata: &Metadata,
    ) -> ProctorResult<()> {
        let source = self.stores.get(transition.source());
        let destination = self.stores.get(transition.destination());

        let found = if src_revision.is_empty() {
            source.current_definition(test_name)?
        } else {
            source.definition_at(test_name, src_revision)?
        };
        let definition = found.ok_or_else(|| {
            PromotionError::source_missing(test_name, transition.source(), src_revision)
        })?;

        let comment = format!(
            "Promoting {} ({} r{}) to {}",
            test_name,
            transition.source(),
            short_revision(src_revision),
            transition.destination()
        );

        let live = destination
            .current_definition(test_name)?
            .map(|_| destination.latest_revision(test_name))
            .transpose()?
            .flatten();

        match live {
            None if dest_revision == UNKNOWN_REVISION => {
                destination.add(credentials, test_name, &definition, metadata, &comment)?;
            }
            None => {
                return Err(PromotionError::destination_moved(
                    test_name,
                    transition.destination(),
                    dest_revision,
                    UNKNOWN_REVISION,
                )
                .into());
            }
            Some(_) => {
                destination.update(
                    credentials,
                    dest_revision,
                    test_name,
                    &definition,
                    metadata,
                    &comment,
                )?;
            }
        }

        info!(test = %test_name, %transition, src_revision, dest_revision, "promoted definition");
        Ok(())
    }
}
