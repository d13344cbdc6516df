use super::common::*;
use crate::classification::{
    ClassificationEngine, ClassificationError, ClassificationKind, ScoringReference,
};
use crate::grid::LetterCode::{A, B, C};
use crate::grid::Variable;

fn engine() -> ClassificationEngine {
    grid().engine().clone()
}

fn classify(letters: &std::collections::BTreeMap<Variable, crate::grid::LetterCode>) -> (u8, u8, String, i32) {
    let classification = engine()
        .classify(letters)
        .expect("reference is complete")
        .expect("complete letters classify");
    assert_eq!(classification.kind, ClassificationKind::Final);
    (
        classification.level.value(),
        classification.breakdown.rank,
        classification.breakdown.decisive_group.clone(),
        classification.breakdown.score,
    )
}

#[test]
fn all_autonomous_is_gir_6() {
    let (level, rank, group, score) = classify(&discriminant_letters(A, &[]));
    assert_eq!((level, rank, group.as_str(), score), (6, 13, "H", 0));
}

#[test]
fn all_dependent_is_gir_1() {
    let (level, rank, group, score) = classify(&discriminant_letters(C, &[]));
    assert_eq!((level, rank, group.as_str(), score), (1, 1, "A", 4440));
}

#[test]
fn all_partial_lands_in_group_g() {
    let (level, rank, group, score) = classify(&discriminant_letters(B, &[]));
    assert_eq!((level, rank, group.as_str(), score), (4, 10, "G", 1100));
}

#[test]
fn body_care_help_is_gir_4() {
    let letters = discriminant_letters(A, &[(Variable::Toilette, B), (Variable::Habillage, B)]);
    let (level, rank, group, score) = classify(&letters);
    assert_eq!((level, rank, group.as_str(), score), (4, 11, "H", 4000));
}

#[test]
fn severe_cognitive_impairment_is_decided_by_group_b() {
    let letters = discriminant_letters(
        A,
        &[(Variable::Coherence, C), (Variable::Orientation, C)],
    );
    let (level, rank, group, score) = classify(&letters);
    assert_eq!((level, rank, group.as_str(), score), (2, 4, "B", 2700));
}

#[test]
fn transfer_and_feeding_dependency_is_decided_by_group_d() {
    let letters = discriminant_letters(
        A,
        &[(Variable::Transferts, C), (Variable::Alimentation, C)],
    );
    let (level, rank, group, score) = classify(&letters);
    assert_eq!((level, rank, group.as_str(), score), (2, 7, "D", 4000));
}

#[test]
fn illustrative_letters_are_ignored() {
    let mut letters = discriminant_letters(A, &[]);
    letters.insert(Variable::Gestion, C);
    letters.insert(Variable::Cuisine, C);
    letters.insert(Variable::DeplacementExterieur, C);

    let (level, _, _, score) = classify(&letters);
    assert_eq!((level, score), (6, 0));
}

#[test]
fn apa_eligibility_follows_level() {
    let engine = engine();
    let dependent = engine
        .classify(&discriminant_letters(C, &[]))
        .expect("classifies")
        .expect("final");
    let autonomous = engine
        .classify(&discriminant_letters(A, &[]))
        .expect("classifies")
        .expect("final");

    assert!(dependent.is_apa_eligible());
    assert!(!autonomous.is_apa_eligible());
}

#[test]
fn provisional_result_skips_groups_weighting_unknown_letters() {
    let mut letters = std::collections::BTreeMap::new();
    letters.insert(Variable::Alimentation, C);
    letters.insert(Variable::Elimination, A);
    letters.insert(Variable::Transferts, C);
    letters.insert(Variable::DeplacementInterieur, A);

    let classification = engine()
        .classify(&letters)
        .expect("no configuration defect")
        .expect("group D is evaluable and decisive");

    assert_eq!(classification.kind, ClassificationKind::Provisional);
    assert_eq!(classification.level.value(), 2);
    assert_eq!(classification.breakdown.decisive_group, "D");
    assert_eq!(classification.breakdown.rank, 7);

    let skipped: Vec<_> = classification
        .breakdown
        .groups
        .iter()
        .filter(|group| !group.evaluable)
        .map(|group| group.group.as_str())
        .collect();
    assert_eq!(skipped, ["A", "B", "C"]);
    assert!(classification.breakdown.groups[0]
        .missing
        .contains(&Variable::Coherence));
}

#[test]
fn provisional_result_is_none_without_decisive_group() {
    let mut letters = std::collections::BTreeMap::new();
    letters.insert(Variable::Alimentation, A);
    letters.insert(Variable::Elimination, A);
    letters.insert(Variable::Transferts, A);
    letters.insert(Variable::DeplacementInterieur, A);

    let outcome = engine().classify(&letters).expect("no configuration defect");
    assert!(outcome.is_none());
}

#[test]
fn complete_letters_without_decisive_group_is_a_defect() {
    let raw = r#"{
        "version": "truncated",
        "groups": [{
            "name": "A",
            "coefficients": {"COHERENCE": {"b": 0, "c": 2000}},
            "thresholds": [{"min": 1000, "rank": 1, "level": 1}]
        }]
    }"#;
    let reference = ScoringReference::from_json(raw).expect("well formed");
    let engine = ClassificationEngine::new(reference, grid().catalog().discriminants())
        .expect("coefficients are discriminant");

    let err = engine
        .classify(&discriminant_letters(A, &[]))
        .expect_err("nothing matches a score of 0");
    assert_eq!(
        err,
        ClassificationError::NoDecisiveGroup {
            reference_version: "truncated".to_string()
        }
    );
}

#[test]
fn reference_weighting_an_illustrative_variable_is_rejected() {
    let raw = r#"{
        "version": "bad",
        "groups": [{
            "name": "A",
            "coefficients": {"GESTION": {"b": 10, "c": 20}},
            "thresholds": [{"min": 0, "rank": 1, "level": 6}]
        }]
    }"#;
    let reference = ScoringReference::from_json(raw).expect("well formed");
    let result = ClassificationEngine::new(reference, grid().catalog().discriminants());
    assert!(result.is_err());
}
