//! Record state machine.
//!
//! The single authority on which status transitions are legal. Everything
//! not in the table is rejected with `InvalidTransition`; `VettedFinal` and
//! `CensoredFinal` accept nothing.

use cairn_types::RecordError;
use cairn_types::RecordStatus;

/// Validate a status transition.
///
/// Legal transitions:
///
/// | from                         | to                  |
/// |------------------------------|---------------------|
/// | Unvetted, IterationUnvetted  | IterationUnvetted   |
/// | Unvetted, IterationUnvetted  | Vetted              |
/// | Unvetted, IterationUnvetted  | Censored            |
/// | Censored                     | Referendum          |
/// | Referendum                   | VettedFinal         |
/// | Referendum                   | CensoredFinal       |
/// | Vetted                       | Vetted (metadata)   |
pub fn validate_transition(from: RecordStatus, to: RecordStatus) -> Result<(), RecordError> {
    use RecordStatus::*;

    let legal = match (from, to) {
        (Unvetted | IterationUnvetted, IterationUnvetted) => true,
        (Unvetted | IterationUnvetted, Vetted) => true,
        (Unvetted | IterationUnvetted, Censored) => true,
        (Censored, Referendum) => true,
        (Referendum, VettedFinal) => true,
        (Referendum, CensoredFinal) => true,
        (Vetted, Vetted) => true,
        _ => false,
    };

    if legal {
        Ok(())
    } else {
        Err(RecordError::InvalidTransition { from, to })
    }
}
