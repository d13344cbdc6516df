use crate::infra::{InMemoryAssessmentRepository, InMemorySessionRepository};
use aggir::assessments::{
    ActorId, AnswerPatch, AssessmentService, ClientSnapshot, MergeRequest, MergeResult,
    OfflineToken, OpenSession, StartAssessment, SubjectRef,
};
use aggir::config::{AppConfig, GridConfig};
use aggir::error::AppError;
use aggir::grid::{AdverbAnswer, Grid, GridEvaluation, SubVariable};
use chrono::SecondsFormat;
use clap::{Args, ValueEnum};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct ClassifyArgs {
    /// JSON file mapping sub-variable codes to S/T/C/H answers
    pub(crate) answers: PathBuf,
    /// Print the full evaluation (letters and every visited group)
    #[arg(long)]
    pub(crate) detailed: bool,
}

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Subject reference used for the demo assessment
    #[arg(long, default_value = "usager-demo")]
    pub(crate) subject: String,
    /// Dependency profile answered by both evaluators
    #[arg(long, value_enum, default_value_t = DemoProfile::Partial)]
    pub(crate) profile: DemoProfile,
    /// Skip the offline session and its conflicting edit
    #[arg(long)]
    pub(crate) skip_offline: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum DemoProfile {
    Autonomous,
    Partial,
    Dependent,
}

impl DemoProfile {
    fn answer(self) -> AdverbAnswer {
        match self {
            DemoProfile::Autonomous => AdverbAnswer::autonomous(),
            DemoProfile::Partial => AdverbAnswer::partial(),
            DemoProfile::Dependent => AdverbAnswer::dependent(),
        }
    }
}

/// Accepts either a bare code map or the `{"answers": {...}}` request body.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ClassifyInput {
    Wrapped { answers: BTreeMap<String, AdverbAnswer> },
    Bare(BTreeMap<String, AdverbAnswer>),
}

impl ClassifyInput {
    fn into_answers(self) -> BTreeMap<String, AdverbAnswer> {
        match self {
            ClassifyInput::Wrapped { answers } | ClassifyInput::Bare(answers) => answers,
        }
    }
}

fn demo_service(
    config: &GridConfig,
) -> Result<AssessmentService<InMemoryAssessmentRepository, InMemorySessionRepository>, AppError> {
    let grid = Arc::new(Grid::load(config)?);
    Ok(AssessmentService::new(
        Arc::new(InMemoryAssessmentRepository::default()),
        Arc::new(InMemorySessionRepository::default()),
        grid,
        config,
    ))
}

pub(crate) fn run_classify(args: ClassifyArgs) -> Result<(), AppError> {
    let ClassifyArgs { answers, detailed } = args;

    let raw = std::fs::read_to_string(&answers)?;
    let input: ClassifyInput = serde_json::from_str(&raw)
        .map_err(|err| AppError::Input(format!("{}: {err}", answers.display())))?;

    let config = AppConfig::load()?;
    let service = demo_service(&config.grid)?;
    let evaluation = service.classify(&input.into_answers())?;

    if detailed {
        let rendered = serde_json::to_string_pretty(&evaluation)
            .map_err(|err| AppError::Input(err.to_string()))?;
        println!("{rendered}");
    } else {
        render_evaluation(&evaluation);
    }
    Ok(())
}

fn render_evaluation(evaluation: &GridEvaluation) {
    println!("Completion: {}%", evaluation.completion_percent);
    let letters: Vec<String> = evaluation
        .variable_letters
        .iter()
        .map(|(variable, letter)| format!("{variable}={letter}"))
        .collect();
    println!("Variable letters: {}", letters.join(" "));

    match &evaluation.classification {
        Some(classification) => {
            println!("Classification: {}", classification.summary());
            println!("  {}", classification.level.description());
            println!(
                "  APA eligible: {}",
                if classification.is_apa_eligible() { "yes" } else { "no" }
            );
        }
        None => println!("Classification: not enough answers"),
    }
}

fn render_merge(label: &str, result: &MergeResult) {
    println!(
        "- {label}: {} answer(s) applied, completion {}%, sync {:?}",
        result.applied.len(),
        result.completion_percent,
        result.sync_status
    );
    for conflict in &result.conflicts {
        println!(
            "    conflict on {}: server {:?}, client {}, base {:?}",
            conflict.sub_variable,
            conflict.server.map(|answer| answer.letter()),
            conflict.client.letter(),
            conflict.client_base.map(|answer| answer.letter()),
        );
    }
    if let Some(provisional) = &result.provisional {
        println!("    provisional {}", provisional.summary());
    }
}

fn patch_for(subs: &[SubVariable], answer: AdverbAnswer) -> AnswerPatch {
    subs.iter()
        .fold(AnswerPatch::default(), |patch, sub| patch.answer(*sub, answer))
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        subject,
        profile,
        skip_offline,
    } = args;

    let service = demo_service(&GridConfig::default())?;
    println!("AGGIR assessment demo");
    println!(
        "Reference data: {} / {}",
        service.grid().structure_version(),
        service.grid().reference_version()
    );

    let started = service.start(StartAssessment {
        subject: SubjectRef(subject),
        evaluator: ActorId("ide-demo".to_string()),
        device_info: Some("cli".to_string()),
        offline_token: None,
    })?;
    let assessment_id = started.assessment.id().clone();
    let online = started.session.id;
    println!(
        "\nStarted {} (expires {})",
        assessment_id,
        started
            .assessment
            .expires_at()
            .to_rfc3339_opts(SecondsFormat::Secs, true)
    );

    let (first_half, second_half) = SubVariable::ALL.split_at(SubVariable::ALL.len() / 2);
    let result = service.merge(
        &online,
        MergeRequest {
            patch: patch_for(first_half, profile.answer()),
            base: None,
        },
    )?;
    render_merge("online session, first half", &result);

    let remaining = if skip_offline {
        patch_for(second_half, profile.answer())
    } else {
        let offline = service.open_session(
            &assessment_id,
            OpenSession {
                actor: ActorId("aide-soignant-demo".to_string()),
                device_info: Some("tablet".to_string()),
                offline_token: Some(OfflineToken("demo-sync-1".to_string())),
            },
        )?;
        let base: ClientSnapshot = service
            .get(&assessment_id)?
            .document()
            .answers
            .iter()
            .map(|(sub, recorded)| (sub.code().to_string(), recorded.answer))
            .collect();

        // the online evaluator revises an answer the tablet already holds
        let revised = first_half[0];
        let result = service.merge(
            &online,
            MergeRequest {
                patch: AnswerPatch::default().answer(revised, AdverbAnswer::autonomous()),
                base: None,
            },
        )?;
        render_merge("online revision", &result);

        let patch =
            patch_for(second_half, profile.answer()).answer(revised, AdverbAnswer::dependent());
        let result = service.merge(
            &offline.id,
            MergeRequest {
                patch,
                base: Some(base),
            },
        )?;
        render_merge("offline sync", &result);
        service.close_session(&offline.id)?;
        AnswerPatch::default()
    };

    let context = remaining
        .field("evaluation.date", json!(chrono::Utc::now().date_naive().to_string()))
        .field("evaluation.lieu", json!("DOMICILE"))
        .field("usager.annee_naissance", json!(1940));
    let result = service.merge(
        &online,
        MergeRequest {
            patch: context,
            base: None,
        },
    )?;
    render_merge("online session, context", &result);
    service.close_session(&online)?;

    service.submit(&assessment_id)?;
    let validated = service.validate(&assessment_id, ActorId("medecin-demo".to_string()))?;
    let view = validated.status_view(service.now());
    println!("\nStatus: {} ({})", view.status, view.summary);

    if let Some(classification) = validated.final_classification() {
        for group in &classification.breakdown.groups {
            println!("  group {}: score {}", group.group, group.score);
        }
    }
    println!("Sessions: {}", service.sessions(&assessment_id)?.len());
    Ok(())
}
