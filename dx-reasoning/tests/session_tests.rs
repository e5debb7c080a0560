//! Integration tests for the question loop, triage and the engine facade.

mod common;

use std::collections::BTreeSet;
use std::sync::Arc;

use dx_core::{Catalog, ConditionId, DurationHint, DxConfig, SelectionStrategy, Severity, UserSymptomData};
use dx_reasoning::temporal::DurationClass;
use dx_reasoning::{
    Answer, Clarification, ClarificationAnswer, DiagnosisEngine, Intensity, SelectionReason, SessionPhase,
    TerminalReason, Topic, TraceKind, TriageLevel,
};

fn headache_mimics(with_mimics: bool) -> Catalog {
    let mut migraine = common::condition("migraine", &["fatigue", "aura"]);
    let mut tension = common::condition("tension_headache", &["fatigue", "neck stiffness"]);
    if with_mimics {
        migraine.mimics = vec![ConditionId::new("tension_headache")];
        tension.mimics = vec![ConditionId::new("migraine")];
    }
    Catalog::new(vec![
        migraine,
        tension,
        common::condition("sinusitis", &["congestion"]),
        common::condition("cluster_headache", &["tearing"]),
    ])
    .unwrap()
}

fn live(engine: &DiagnosisEngine) -> Vec<Arc<dx_core::Condition>> {
    ["migraine", "tension_headache", "sinusitis"]
        .iter()
        .filter_map(|id| engine.index().get(id).cloned())
        .collect()
}

#[test]
fn test_mimic_pair_prefers_separating_token() {
    let engine = common::engine(headache_mimics(true)).unwrap();
    let session = engine.session_with(live(&engine), &UserSymptomData::default()).unwrap();

    let question = session.next_question().unwrap();
    assert_eq!(question.token().unwrap().symptom, "aura");
    assert_eq!(
        question.reason,
        SelectionReason::Mimic {
            a: ConditionId::new("migraine"),
            b: ConditionId::new("tension_headache"),
        }
    );
}

#[test]
fn test_without_mimics_global_ranking_wins() {
    let engine = common::engine(headache_mimics(false)).unwrap();
    let session = engine.session_with(live(&engine), &UserSymptomData::default()).unwrap();

    let question = session.next_question().unwrap();
    assert_eq!(question.token().unwrap().symptom, "fatigue");
    assert_eq!(question.reason, SelectionReason::GlobalRanking { rank: 0 });
    assert_eq!(question.text, "Do you also experience fatigue?");
}

#[test]
fn test_information_gain_strategy() {
    let mut config = DxConfig::default();
    config.engine.selection_strategy = SelectionStrategy::InformationGain;
    let engine = common::engine_with(headache_mimics(false), config).unwrap();
    let session = engine.session_with(live(&engine), &UserSymptomData::default()).unwrap();

    let question = session.next_question().unwrap();
    assert!(matches!(question.reason, SelectionReason::InformationGain { bits } if bits > 0.0));
}

#[test]
fn test_confident_leader_ends_session() {
    let catalog = Catalog::new(vec![
        common::weighted(
            common::weighted(common::condition("a", &["s1", "s2"]), "s1", 0.9, 0.8, 2.0),
            "s2",
            0.9,
            0.8,
            2.0,
        ),
        common::condition("b", &["x"]),
        common::condition("c", &["y"]),
    ])
    .unwrap();
    let engine = common::engine(catalog).unwrap();
    let candidates = engine.index().catalog().all();
    let mut session = engine.session_with(candidates, &UserSymptomData::default()).unwrap();

    assert_eq!(session.answer(Answer::has("s1")).unwrap(), SessionPhase::Updating);
    let phase = session.answer(Answer::has("s2")).unwrap();
    assert_eq!(phase, SessionPhase::Terminal(TerminalReason::Confident));
    assert!(session.next_question().is_none());
    assert!(session.answer(Answer::has("x")).is_err());

    let report = session.finish().unwrap();
    let top = report.top().unwrap();
    assert_eq!(top.condition.id.as_str(), "a");
    assert!(top.confidence_percent() >= 90.0);
    assert_eq!(report.questions_asked, 2);
}

#[tokio::test]
async fn test_emergency_text_raises_alert() {
    let engine = common::engine(common::headache_catalog().unwrap()).unwrap();
    let data = UserSymptomData {
        locations: vec!["chest".to_string()],
        additional_notes: Some("Crushing chest pain spreading to my left arm, sweating".to_string()),
        ..Default::default()
    };

    let session = engine.start_session(&data).await.unwrap();
    assert!(session.alerts().iter().any(|a| a.rule == "cardiac"));

    let report = session.finish().unwrap();
    assert!(report.has_emergency());
    assert!(!report.results.is_empty());
}

#[test]
fn test_red_flag_from_answers() {
    let mut meningitis = common::condition("meningitis", &["stiff neck", "fever"]);
    meningitis.severity = Severity::Critical;
    meningitis.red_flags = vec!["stiff neck + fever".to_string()];
    let catalog = Catalog::new(vec![meningitis, common::condition("tension", &["stress"])]).unwrap();
    let engine = common::engine(catalog).unwrap();
    let candidates = engine.index().catalog().all();
    let mut session = engine.session_with(candidates, &UserSymptomData::default()).unwrap();
    assert!(session.alerts().is_empty());

    session.answer(Answer::has("stiff neck")).unwrap();
    assert!(session.alerts().is_empty());
    session.answer(Answer::has("fever")).unwrap();

    let alert = session
        .alerts()
        .iter()
        .find(|a| a.condition == Some(ConditionId::new("meningitis")))
        .unwrap();
    assert_eq!(alert.level, TriageLevel::Emergency);
}

#[tokio::test]
async fn test_intake_notes_seed_answers() {
    let engine = common::engine(common::headache_catalog().unwrap()).unwrap();
    let data = UserSymptomData {
        locations: vec!["head".to_string()],
        additional_notes: Some("throbbing pain with light sensitivity, no pressure".to_string()),
        ..Default::default()
    };

    let session = engine.start_session(&data).await.unwrap();
    assert_eq!(
        session.known(),
        BTreeSet::from(["light sensitivity".to_string(), "throbbing".to_string()])
    );
    assert_eq!(session.excluded(), BTreeSet::from(["pressure".to_string()]));
    assert_eq!(session.phase(), SessionPhase::Terminal(TerminalReason::Confident));

    let report = session.finish().unwrap();
    assert_eq!(report.top().unwrap().condition.id.as_str(), "a");
    assert_eq!(report.questions_asked, 0);
}

#[test]
fn test_compound_question_round() {
    let catalog = Catalog::new(vec![
        common::condition("a", &["nausea", "aura"]),
        common::condition("b", &["fever", "rash"]),
        common::condition("c", &["cough"]),
    ])
    .unwrap();
    let engine = common::engine(catalog).unwrap();
    let candidates = engine.index().catalog().all();
    let mut session = engine.session_with(candidates, &UserSymptomData::default()).unwrap();

    let question = session.next_compound_question(3).unwrap();
    assert_eq!(question.options.len(), 3);
    assert_eq!(question.labels().len(), 4);

    let picked = vec![question.options[0].clone()];
    session.answer_compound(&question, &picked).unwrap();
    assert_eq!(session.known().len(), 1);
    assert_eq!(session.excluded().len(), 2);
}

#[test]
fn test_duration_clarification_round() {
    let mut cluster = common::condition("cluster_headache", &["tearing", "nausea"]);
    cluster.match_criteria.duration_hint = Some(DurationHint::Acute);
    let mut tension = common::condition("chronic_tension", &["tearing", "nausea"]);
    tension.match_criteria.duration_hint = Some(DurationHint::Chronic);
    let engine = common::engine(Catalog::new(vec![cluster, tension]).unwrap()).unwrap();
    let candidates = engine.index().catalog().all();
    let mut session = engine.session_with(candidates, &UserSymptomData::default()).unwrap();

    let question = session.next_question().unwrap();
    assert_eq!(question.topic, Topic::Clarification(Clarification::Duration));
    assert_eq!(question.text, "How long have you been experiencing these symptoms?");
    assert_eq!(question.options[1], "Long time (Months/Years)");

    // shared symptoms leave nothing else to ask
    let phase = session.respond(&question, 1).unwrap();
    assert_eq!(phase, SessionPhase::Terminal(TerminalReason::NoInformativeQuestion));
    assert!((session.belief().probability("chronic_tension") - 0.6).abs() < 1e-9);
    assert_eq!(
        session.clarifications().collect::<Vec<_>>(),
        vec![&ClarificationAnswer::Duration(DurationClass::Chronic)]
    );
    let trace = session.belief().get("chronic_tension").unwrap().trace();
    assert!(trace.iter().any(|e| e.kind == TraceKind::Temporal));
}

#[test]
fn test_intensity_reply_can_be_revised() {
    let mut migraine = common::condition("migraine", &["aura", "fatigue"]);
    migraine.severity = Severity::Severe;
    let mut tension = common::condition("tension", &["fatigue"]);
    tension.severity = Severity::Mild;
    let engine = common::engine(Catalog::new(vec![migraine, tension]).unwrap()).unwrap();
    let candidates = engine.index().catalog().all();
    let mut session = engine.session_with(candidates, &UserSymptomData::default()).unwrap();

    let question = session.next_question().unwrap();
    assert_eq!(question.topic, Topic::Clarification(Clarification::Intensity));
    assert!(matches!(question.reason, SelectionReason::Clarification { .. }));

    session
        .answer_clarification(ClarificationAnswer::Intensity(Intensity::Severe))
        .unwrap();
    assert!((session.belief().probability("migraine") - 0.6).abs() < 1e-9);
    let next = session.next_question().unwrap();
    assert_eq!(next.token().unwrap().symptom, "aura");

    session
        .answer_clarification(ClarificationAnswer::Intensity(Intensity::Mild))
        .unwrap();
    assert!((session.belief().probability("migraine") - 0.4).abs() < 1e-9);
    let trace = session.belief().get("migraine").unwrap().trace();
    assert!(trace.iter().any(|e| e.kind == TraceKind::Revised));
    assert_eq!(session.clarifications().count(), 1);
}

#[tokio::test]
async fn test_failed_embeddings_still_start_session() {
    let engine = common::engine(common::headache_catalog().unwrap())
        .unwrap()
        .with_embeddings(Arc::new(common::FailingEmbeddings));

    let session = engine.start_session(&UserSymptomData::at(["head"])).await.unwrap();
    assert_eq!(session.belief().len(), 2);
    assert!(session.next_question().is_some());
}

#[tokio::test]
async fn test_engine_from_files() {
    let dir = tempfile::tempdir().unwrap();
    let catalog_path = common::write_file(
        dir.path(),
        "conditions.json",
        r#"[
            {"id": "migraine", "name": "Migraine", "prevalence": "common",
             "matchCriteria": {"locations": ["head"], "specialSymptoms": ["nausea", "aura"]}},
            {"id": "tension", "name": "Tension headache", "prevalence": "very_common",
             "matchCriteria": {"locations": ["head"], "specialSymptoms": ["stress"]}}
        ]"#,
    )
    .unwrap();
    let config_path = common::write_file(
        dir.path(),
        "dx.yaml",
        "engine:\n  early_exit_confidence: 80\n  selection_strategy: information_gain\n",
    )
    .unwrap();

    let config = DxConfig::from_path(&config_path).unwrap();
    let engine = DiagnosisEngine::from_catalog(Catalog::from_path(&catalog_path).unwrap(), config).unwrap();
    assert_eq!(engine.config().engine.selection_strategy, SelectionStrategy::InformationGain);

    let mut session = engine.start_session(&UserSymptomData::at(["head"])).await.unwrap();
    // very common beats common before any answer
    assert_eq!(session.ranked()[0].0.as_str(), "tension");

    session.answer(Answer::has("aura")).unwrap();
    session.answer(Answer::has("nausea")).unwrap();
    let report = session.finish().unwrap();
    assert_eq!(report.top().unwrap().condition.id.as_str(), "migraine");

    let json = serde_json::to_value(&report).unwrap();
    assert!(json["results"][0]["uncertainty"]["confidenceInterval"]["width"].is_number());
}

#[tokio::test]
async fn test_replace_index_changes_retrieval() {
    let mut engine = common::engine(common::headache_catalog().unwrap()).unwrap();
    let rebuilt = dx_core::IndexStore::shared(
        Catalog::new(vec![common::located("sprain", &["ankle"], &["swelling"])]).unwrap(),
        &engine.config().index,
    );
    engine.replace_index(rebuilt).await;

    let candidates = engine.retrieve(&UserSymptomData::at(["ankle"])).await;
    assert_eq!(common::ids(&candidates), vec!["sprain"]);
}
