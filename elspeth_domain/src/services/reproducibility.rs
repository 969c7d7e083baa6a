// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Reproducibility Grading
//!
//! Pure rules for grading a run from the determinism declarations of its
//! nodes. Applied by `finalize_run` and again by the retention purge.
//!
//! The rules are deliberately simple:
//!
//! - Any `non_deterministic` or `external_call` node caps the run at
//!   REPLAY_REPRODUCIBLE: outputs can be replayed from retained payloads
//!   but not regenerated.
//! - `seeded` counts as reproducible: the seed is part of the node config.
//! - `io_read`/`io_write` are reproducible given the same external world;
//!   the grade does not model external drift.
//! - Purging payloads degrades REPLAY_REPRODUCIBLE to ATTRIBUTABLE_ONLY;
//!   FULL_REPRODUCIBLE runs keep their grade (the config regenerates the
//!   data, no payloads needed).

use crate::entities::node::Determinism;
use crate::entities::run::ReproducibilityGrade;

/// Grades a run from the determinism declarations of its nodes.
pub fn grade_from_determinism<I>(determinisms: I) -> ReproducibilityGrade
where
    I: IntoIterator<Item = Determinism>,
{
    let mut grade = ReproducibilityGrade::FullReproducible;
    for determinism in determinisms {
        match determinism {
            Determinism::NonDeterministic | Determinism::ExternalCall => {
                grade = ReproducibilityGrade::ReplayReproducible;
            }
            Determinism::Deterministic
            | Determinism::Seeded
            | Determinism::IoRead
            | Determinism::IoWrite => {}
        }
    }
    grade
}

/// The grade a run holds after its payloads are purged.
pub fn grade_after_purge(grade: ReproducibilityGrade) -> ReproducibilityGrade {
    match grade {
        ReproducibilityGrade::ReplayReproducible => ReproducibilityGrade::AttributableOnly,
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_deterministic_grades_full() {
        let grade = grade_from_determinism([
            Determinism::Deterministic,
            Determinism::Seeded,
            Determinism::IoRead,
        ]);
        assert_eq!(grade, ReproducibilityGrade::FullReproducible);
    }

    #[test]
    fn external_call_caps_at_replay() {
        let grade = grade_from_determinism([
            Determinism::Deterministic,
            Determinism::ExternalCall,
        ]);
        assert_eq!(grade, ReproducibilityGrade::ReplayReproducible);
    }

    #[test]
    fn non_deterministic_caps_at_replay() {
        let grade = grade_from_determinism([Determinism::NonDeterministic]);
        assert_eq!(grade, ReproducibilityGrade::ReplayReproducible);
    }

    #[test]
    fn purge_degrades_replay_only() {
        assert_eq!(
            grade_after_purge(ReproducibilityGrade::ReplayReproducible),
            ReproducibilityGrade::AttributableOnly
        );
        assert_eq!(
            grade_after_purge(ReproducibilityGrade::FullReproducible),
            ReproducibilityGrade::FullReproducible
        );
        assert_eq!(
            grade_after_purge(ReproducibilityGrade::AttributableOnly),
            ReproducibilityGrade::AttributableOnly
        );
    }
}
