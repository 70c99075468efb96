//! Random template selection

use rand::seq::SliceRandom;
use rand::Rng;

use crate::backend::TemplateSummary;
use crate::error::GenerationError;

/// Template category requested from the provider
pub const TEMPLATE_CATEGORY: i64 = 1;

/// Pick one template uniformly at random
///
/// The choice is always a member of `candidates`.
///
/// # Errors
///
/// Returns [`GenerationError::Provider`] when the provider offered no
/// templates.
pub fn select_template<'a, R: Rng + ?Sized>(
    candidates: &'a [TemplateSummary],
    rng: &mut R,
) -> Result<&'a TemplateSummary, GenerationError> {
    candidates
        .choose(rng)
        .ok_or_else(|| GenerationError::provider("randomTemplates", "no templates available"))
}
