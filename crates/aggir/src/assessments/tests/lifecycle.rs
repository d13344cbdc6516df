use chrono::Duration;

use super::common::*;
use crate::assessments::{
    ActorId, AssessmentError, AssessmentStatus, MergeError, SessionMerger, ViolationKind,
};
use crate::grid::{LetterCode, SubVariable};

#[test]
fn transition_table_only_allows_documented_moves() {
    use AssessmentStatus::*;
    let all = [Draft, PendingValidation, Validated, Expired, Cancelled, Archived];
    let allowed = [
        (Draft, PendingValidation),
        (Draft, Expired),
        (Draft, Cancelled),
        (PendingValidation, Validated),
        (Validated, Archived),
    ];

    for from in all {
        for to in all {
            assert_eq!(
                from.can_transition_to(to),
                allowed.contains(&(from, to)),
                "{from} -> {to}"
            );
        }
    }
}

#[test]
fn submit_names_the_unresolved_variable() {
    let grid = grid();
    let mut assessment = draft(&grid);
    let mut session = session_on(&assessment, "s1", None);
    let merger = SessionMerger::new(&grid);

    let mut patch = answers_patch(LetterCode::A, &[SubVariable::Gestion]);
    patch.fields = context_fields().fields;
    merger
        .merge(&mut assessment, &mut session, &patch, None, t0())
        .expect("merge succeeds");
    assert_eq!(assessment.variable_letters().len(), 16);

    match assessment.submit(&grid, t0()) {
        Err(AssessmentError::Incomplete(violations)) => {
            assert_eq!(violations.len(), 1);
            assert_eq!(violations[0].path, "answers.GESTION");
            assert_eq!(violations[0].kind, ViolationKind::MissingRequiredField);
        }
        other => panic!("expected incomplete submission, got {other:?}"),
    }
    assert_eq!(assessment.status(), AssessmentStatus::Draft);

    let resolve = crate::assessments::AnswerPatch::default()
        .answer(SubVariable::Gestion, answer_for(LetterCode::B));
    merger
        .merge(&mut assessment, &mut session, &resolve, None, t0())
        .expect("merge succeeds");
    assessment.submit(&grid, t0()).expect("complete submission");
    assert_eq!(assessment.status(), AssessmentStatus::PendingValidation);
}

#[test]
fn validation_freezes_the_final_classification() {
    let grid = grid();
    let mut assessment = draft(&grid);
    let mut session = session_on(&assessment, "s1", None);
    SessionMerger::new(&grid)
        .merge(
            &mut assessment,
            &mut session,
            &complete_patch(LetterCode::C),
            None,
            t0(),
        )
        .expect("merge succeeds");

    assert!(assessment.provisional().is_some_and(|c| c.is_final()));
    assessment.submit(&grid, t0()).expect("complete");

    let level = assessment
        .validate(&grid, ActorId("medecin-apa".to_string()), t0())
        .expect("validates")
        .level;
    assert_eq!(level.value(), 1);
    assert_eq!(assessment.status(), AssessmentStatus::Validated);
    assert!(assessment.provisional().is_none());
    assert_eq!(
        assessment.validated_by(),
        Some(&ActorId("medecin-apa".to_string()))
    );

    let err = assessment
        .validate(&grid, ActorId("other".to_string()), t0())
        .expect_err("already validated");
    assert!(matches!(
        err,
        AssessmentError::IllegalTransition {
            from: AssessmentStatus::Validated,
            to: AssessmentStatus::Validated
        }
    ));

    assessment.archive(t0()).expect("archives");
    assert_eq!(assessment.status(), AssessmentStatus::Archived);
    assert_eq!(
        assessment.final_classification().map(|c| c.level.value()),
        Some(1)
    );
}

#[test]
fn cancel_clears_the_provisional_classification() {
    let grid = grid();
    let mut assessment = draft(&grid);
    let mut session = session_on(&assessment, "s1", None);
    SessionMerger::new(&grid)
        .merge(
            &mut assessment,
            &mut session,
            &answers_patch(LetterCode::A, &[]),
            None,
            t0(),
        )
        .expect("merge succeeds");
    assert!(assessment.provisional().is_some());

    assessment.cancel(t0()).expect("draft can be cancelled");
    assert_eq!(assessment.status(), AssessmentStatus::Cancelled);
    assert!(assessment.provisional().is_none());

    let err = assessment.archive(t0()).expect_err("cancelled is terminal");
    assert!(matches!(err, AssessmentError::IllegalTransition { .. }));
}

#[test]
fn draft_expires_lazily() {
    let grid = grid();
    let mut assessment = draft(&grid);
    let mut session = session_on(&assessment, "s1", None);
    let late = t0() + Duration::days(7) + Duration::seconds(1);

    assert_eq!(assessment.status_at(t0() + Duration::days(7)), AssessmentStatus::Draft);
    assert_eq!(assessment.status_at(late), AssessmentStatus::Expired);

    let patch = answers_patch(LetterCode::A, &[]);
    let err = SessionMerger::new(&grid)
        .merge(&mut assessment, &mut session, &patch, None, late)
        .expect_err("expired drafts reject merges");
    assert!(matches!(
        err,
        MergeError::Assessment(AssessmentError::NotWritable {
            status: AssessmentStatus::Expired,
            ..
        })
    ));
    assert_eq!(assessment.status(), AssessmentStatus::Expired);
    assert!(assessment.document().answers.is_empty());

    let err = assessment.submit(&grid, late).expect_err("no submission");
    assert!(matches!(err, AssessmentError::NotWritable { .. }));
}

#[test]
fn incomplete_sub_variables_follow_catalog_order() {
    let grid = grid();
    let mut assessment = draft(&grid);
    let mut session = session_on(&assessment, "s1", None);
    let patch = answers_patch(
        LetterCode::A,
        &[SubVariable::Espace, SubVariable::Achats],
    );
    SessionMerger::new(&grid)
        .merge(&mut assessment, &mut session, &patch, None, t0())
        .expect("merge succeeds");

    let missing: Vec<_> = assessment.incomplete_sub_variables(&grid).collect();
    assert_eq!(missing, [SubVariable::Espace, SubVariable::Achats]);
}
