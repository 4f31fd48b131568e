use crate::infra::{load_catalog, DEMO_LEARNER};
use chrono::Utc;
use clap::Args;
use skillgate::error::AppError;
use skillgate::learning::{
    AttemptId, AttemptOutput, CannedHintGenerator, CatalogFile, ChallengeId, CourseId,
    CourseLearningView, GateSubmission, HintPolicy, HintRequest, InMemoryAttempts,
    InMemoryCourseCatalog, InMemoryProgressStore, JudgeAttempt, LearningService, ManualClock,
    TopicId, UserId,
};
use std::path::PathBuf;
use std::sync::Arc;

const DEMO_COURSE: &str = "rust-101";
const DEMO_ATTEMPT: &str = "demo-attempt-1";

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Print the final course view as JSON.
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug)]
pub(crate) struct CatalogCheckArgs {
    /// Catalog JSON file to validate
    #[arg(long)]
    pub(crate) path: PathBuf,
}

pub(crate) fn run_catalog_check(args: CatalogCheckArgs) -> Result<(), AppError> {
    let catalog = CatalogFile::from_path(&args.path)?;
    println!(
        "Catalog {} is valid ({} course{})",
        args.path.display(),
        catalog.courses.len(),
        if catalog.courses.len() == 1 { "" } else { "s" }
    );

    for course in &catalog.courses {
        let challenges: usize = course
            .topics
            .values()
            .map(|topic| topic.challenges.len())
            .sum();
        let static_hints: usize = course
            .topics
            .values()
            .flat_map(|topic| topic.challenges.iter())
            .map(|challenge| challenge.hints.len())
            .sum();
        println!(
            "- {} \"{}\": {} levels | {} topics | {} challenges | {} static hints",
            course.id,
            course.title,
            course.levels.len(),
            course.topics.len(),
            challenges,
            static_hints
        );
        for level in &course.levels {
            let topics: Vec<&str> = level.topic_ids.iter().map(TopicId::as_str).collect();
            println!("    {} -> {}", level.name, topics.join(", "));
        }
    }

    Ok(())
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let catalog = load_catalog(None)?;
    let store = InMemoryProgressStore::default();
    let learner = UserId::from(DEMO_LEARNER);
    store.register_profile(learner.clone()).await;
    let attempts = InMemoryAttempts::default();
    let clock = Arc::new(ManualClock::new(Utc::now()));

    let service = LearningService::new(
        Arc::new(store),
        Arc::new(InMemoryCourseCatalog::from_courses(catalog.courses)?),
        Arc::new(attempts.clone()),
        Arc::new(CannedHintGenerator::default()),
        HintPolicy::default(),
    )
    .with_clock(clock.clone());

    let course = CourseId::from(DEMO_COURSE);
    println!("Learning gate demo (learner {learner})");

    let view = match service.get_course_learning_view(&learner, &course).await {
        Ok(view) => view,
        Err(err) => {
            println!("  Course unavailable: {}", err);
            return Ok(());
        }
    };
    render_course(&view, "Initial state");

    for topic in ["variables", "functions"] {
        let submission = GateSubmission {
            challenge_id: None,
            passed: true,
            attempt_id: None,
        };
        match service
            .record_topic_gate_result(&learner, &course, &TopicId::from(topic), submission)
            .await
        {
            Ok(view) => render_course(&view, &format!("After passing \"{topic}\"")),
            Err(err) => {
                println!("  Gate submission rejected: {}", err);
                return Ok(());
            }
        }
    }

    attempts
        .record(JudgeAttempt {
            id: AttemptId::from(DEMO_ATTEMPT),
            user_id: learner.clone(),
            challenge_id: Some(ChallengeId::from("ownership-move")),
            source_code: "let name = String::from(\"ferris\");\ngreet(name);\nprintln!(\"{name}\");"
                .to_string(),
            result: AttemptOutput {
                stdout: None,
                stderr: Some("error[E0382]: borrow of moved value: `name`".to_string()),
            },
        })
        .await;

    println!("\nHint requests on \"ownership-move\" (61s apart)");
    let topic = TopicId::from("ownership");
    let challenge = ChallengeId::from("ownership-move");
    for number in 1..=4 {
        let request = HintRequest {
            attempt_id: Some(AttemptId::from(DEMO_ATTEMPT)),
            message: None,
        };
        match service
            .request_hint_for_challenge(&learner, &course, &topic, &challenge, request)
            .await
        {
            Ok(hint) => {
                println!(
                    "- Hint {} [{}] -{} XP: {}",
                    number,
                    hint.source.label(),
                    hint.penalty_applied,
                    hint.hint
                );
                println!(
                    "  topic penalty {} | {} remaining",
                    hint.topic_hint_penalty, hint.remaining_hints
                );
            }
            Err(err) => println!("- Hint {} denied: {}", number, err),
        }
        clock.advance(chrono::Duration::seconds(61));
    }

    let view = match service.get_course_learning_view(&learner, &course).await {
        Ok(view) => view,
        Err(err) => {
            println!("  Course unavailable: {}", err);
            return Ok(());
        }
    };
    render_course(&view, "Final state");

    if args.json {
        match serde_json::to_string_pretty(&view) {
            Ok(json) => println!("\nCourse view payload:\n{}", json),
            Err(err) => println!("\nCourse view payload unavailable: {}", err),
        }
    }

    Ok(())
}

fn render_course(view: &CourseLearningView, heading: &str) {
    println!("\n{heading}");
    println!(
        "  {} [{}]",
        view.course.title,
        view.course.status.label()
    );
    for level in &view.levels {
        println!("  - {} [{}]", level.name, level.status.label());
        for topic in &level.topics {
            println!(
                "      {} [{}] attempts={} hints={} penalty={}",
                topic.summary.title,
                topic.progress.status.label(),
                topic.progress.attempts,
                topic.progress.hints_used,
                topic.progress.hint_penalty
            );
        }
    }
    println!(
        "  Totals: {} XP earned | {} hint penalty | {} net | {} topics completed",
        view.totals.base_xp,
        view.totals.hint_penalty,
        view.totals.net_xp,
        view.totals.completed_topics
    );
}
