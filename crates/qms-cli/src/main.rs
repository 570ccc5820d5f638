use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use qms_core::{
    ActionId, ActionStatus, AnalyzeRootCause, AuditId, AuditType, ComplianceStatus,
    ConformityStatus, CreateAction, EditAudit, ExecuteImmediateAction, FindingId, FindingStatus,
    MeetingInput,
    PlanAudit, PlanImmediateAction, Priority, RecordRelation, RecordVerification, RegisterFinding,
    RegisterNormPoint, RelationId, ReportDeliveryInput, SourceType, SubjectType, UserId,
    VerifyEffectiveness,
};
use qms_engine::Qms;

#[derive(Parser)]
#[command(name = "qms", version)]
struct Cli {
    /// Identity stamped on mutations (falls back to the configured default user)
    #[arg(long, global = true)]
    user: Option<String>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Initialize QMS in the current directory (creates .qms/, config, db)
    Init,

    /// Show a basic status snapshot
    Status,

    /// Register a norm point in the registry
    NormPointAdd {
        #[arg(long)]
        chapter: String,
        #[arg(long)]
        section: String,
        #[arg(long)]
        requirement: String,
        #[arg(long, default_value = "general")]
        category: String,
        #[arg(long, default_value_t = false)]
        mandatory: bool,
    },

    /// List registered norm points
    NormPointList,

    /// Plan an audit (complete derives its selection from the mandatory set)
    AuditPlan {
        #[arg(long)]
        title: String,
        /// complete | partial
        #[arg(long, default_value = "partial")]
        audit_type: String,
        #[arg(long)]
        scope: String,
        /// YYYY-MM-DD
        #[arg(long)]
        date: String,
        #[arg(long)]
        lead: String,
        /// Norm point codes for a partial audit (repeatable)
        #[arg(long = "point")]
        points: Vec<String>,
    },

    /// List audits with status and verification progress
    AuditList,

    /// Move a planned audit into execution
    AuditStart {
        #[arg(long)]
        id: String,
    },

    /// Record the conformity verdict for one norm point of a running audit
    AuditVerify {
        #[arg(long)]
        id: String,
        #[arg(long)]
        point: String,
        /// CF | NCM | NCm | NCT | R | OM | F
        #[arg(long)]
        verdict: String,
        #[arg(long = "process")]
        processes: Vec<String>,
        #[arg(long)]
        observations: Option<String>,
    },

    /// Record the opening or closing meeting of a running audit
    AuditMeeting {
        #[arg(long)]
        id: String,
        #[arg(long, default_value_t = false)]
        closing: bool,
        #[arg(long = "attendee")]
        attendees: Vec<String>,
        #[arg(long)]
        notes: Option<String>,
    },

    /// Record execution observations for an audit
    AuditObserve {
        #[arg(long)]
        id: String,
        #[arg(long)]
        text: String,
    },

    /// Record report delivery for an audit
    AuditReport {
        #[arg(long)]
        id: String,
        #[arg(long = "to")]
        delivered_to: Vec<String>,
        #[arg(long)]
        notes: Option<String>,
    },

    /// Show what still blocks (or merely warns about) completing an audit
    AuditCheck {
        #[arg(long)]
        id: String,
    },

    /// Complete a fully verified audit
    AuditComplete {
        #[arg(long)]
        id: String,
    },

    /// Edit plan-time fields of a still-planned audit
    AuditEdit {
        #[arg(long)]
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        scope: Option<String>,
        /// YYYY-MM-DD
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        lead: Option<String>,
        #[arg(long = "point")]
        points: Vec<String>,
    },

    /// Soft-delete an audit
    AuditDelete {
        #[arg(long)]
        id: String,
    },

    /// Register a finding manually
    FindingRegister {
        #[arg(long)]
        origin: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: String,
        /// audit | process | complaint | review | other
        #[arg(long, default_value = "other")]
        source: String,
        #[arg(long)]
        process: Option<String>,
    },

    /// Spawn a finding from a non-conforming norm point of an audit
    FindingFromAudit {
        #[arg(long)]
        audit: String,
        #[arg(long)]
        point: String,
    },

    /// List findings with phase and progress
    FindingList {
        /// registered | action_planned | action_executed | analysis_completed | closed
        #[arg(long)]
        status: Option<String>,
    },

    /// Phase 2: plan the immediate action for a finding
    FindingPlan {
        #[arg(long)]
        id: String,
        #[arg(long)]
        responsible: String,
        /// YYYY-MM-DD
        #[arg(long)]
        date: String,
        #[arg(long)]
        comments: Option<String>,
    },

    /// Phase 3: record execution of the immediate action
    FindingExecute {
        #[arg(long)]
        id: String,
        /// YYYY-MM-DD
        #[arg(long)]
        date: String,
        #[arg(long)]
        correction: String,
    },

    /// Phase 4: record the root cause analysis
    FindingAnalyze {
        #[arg(long)]
        id: String,
        #[arg(long)]
        analysis: String,
        #[arg(long, default_value_t = false)]
        requires_action: bool,
    },

    /// Phase 5: close a finding whose analysis is complete
    FindingClose {
        #[arg(long)]
        id: String,
    },

    /// Create a corrective action for a finding
    ActionAdd {
        #[arg(long)]
        finding: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: String,
        #[arg(long)]
        responsible: String,
        /// YYYY-MM-DD
        #[arg(long)]
        date: String,
        /// low | medium | high
        #[arg(long, default_value = "medium")]
        priority: String,
    },

    /// List actions, optionally scoped to one finding or one status
    ActionList {
        #[arg(long)]
        finding: Option<String>,
        /// planned | in_execution | completed | cancelled
        #[arg(long)]
        status: Option<String>,
    },

    /// Move an action to a new status
    ActionStatus {
        #[arg(long)]
        id: String,
        /// planned | in_execution | completed | cancelled
        #[arg(long)]
        status: String,
        #[arg(long)]
        comment: Option<String>,
    },

    /// Record execution progress (clamped into 0..=100)
    ActionProgress {
        #[arg(long)]
        id: String,
        #[arg(long)]
        percent: i64,
        #[arg(long)]
        comment: Option<String>,
    },

    /// Record an effectiveness verification verdict
    ActionVerify {
        #[arg(long)]
        id: String,
        #[arg(long)]
        effective: bool,
        /// YYYY-MM-DD, defaults to today
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        follow_up: Option<String>,
    },

    /// Complete an action with closing evidence
    ActionClose {
        #[arg(long)]
        id: String,
        #[arg(long)]
        evidence: String,
    },

    /// Move an action's due date (notifies the calendar publisher)
    ActionReschedule {
        #[arg(long)]
        id: String,
        /// YYYY-MM-DD
        #[arg(long)]
        date: String,
    },

    /// Record a compliance relation between a norm point and a subject
    RelationAdd {
        #[arg(long)]
        point: String,
        /// process | document | procedure | policy
        #[arg(long)]
        subject_type: String,
        #[arg(long)]
        subject: String,
        /// compliant | non_compliant | partial | not_applicable
        #[arg(long)]
        status: String,
        #[arg(long = "evidence")]
        evidence: Vec<String>,
        #[arg(long)]
        notes: Option<String>,
    },

    /// Re-verify an existing relation with a new classification
    RelationReclassify {
        #[arg(long)]
        id: String,
        /// compliant | non_compliant | partial | not_applicable
        #[arg(long)]
        status: String,
        #[arg(long = "evidence")]
        evidence: Vec<String>,
        #[arg(long)]
        notes: Option<String>,
    },

    /// Soft-delete a relation
    RelationDelete {
        #[arg(long)]
        id: String,
    },

    /// Print the compliance matrix as JSON
    Matrix,

    /// Print aggregate statistics as JSON
    Stats {
        /// audits | findings | actions
        #[arg(long, default_value = "audits")]
        subject: String,
    },

    /// Print month-over-month audit trend buckets as JSON
    Trends {
        #[arg(long, default_value_t = 6)]
        months: u32,
    },
}

/// The core enums already carry their wire spelling via serde; the CLI reuses
/// it instead of maintaining a parallel parser.
fn parse_enum<T: serde::de::DeserializeOwned>(what: &str, value: &str) -> anyhow::Result<T> {
    serde_json::from_value(serde_json::Value::String(value.to_string()))
        .with_context(|| format!("invalid {what}: {value}"))
}

fn parse_date(value: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("invalid date (expected YYYY-MM-DD): {value}"))
}

fn actor(qms: &Qms, user: &Option<String>) -> UserId {
    let name = user
        .clone()
        .or_else(|| qms.cfg.organization.default_user.clone())
        .unwrap_or_else(|| "cli".to_string());
    UserId::from_str(name)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let root = std::env::current_dir()?;

    if let Command::Init = cli.cmd {
        Qms::init(&root)?;
        println!("Initialized QMS in {}", root.display());
        return Ok(());
    }

    let qms = Qms::open(root)?;
    let by = actor(&qms, &cli.user);

    match cli.cmd {
        Command::Init => unreachable!("handled above"),
        Command::Status => {
            println!("Norm points: {}", qms.registry.list()?.len());
            let audits = qms.audits.list()?;
            println!("Audits: {}", audits.len());
            for a in &audits {
                println!(
                    "- {} [{:?}] {} ({}/{} verified)",
                    a.audit_number,
                    a.status,
                    a.title,
                    a.verifications.len() - a.unverified_count(),
                    a.verifications.len()
                );
            }
            println!("Findings: {}", qms.findings.list(None)?.len());
            println!("Actions: {}", qms.actions.list(None)?.len());
        }
        Command::NormPointAdd { chapter, section, requirement, category, mandatory } => {
            let point = qms.registry.register(
                RegisterNormPoint {
                    chapter,
                    section,
                    requirement_text: requirement,
                    category,
                    is_mandatory: mandatory,
                    related_processes: vec![],
                    related_documents: vec![],
                },
                &by,
            )?;
            println!("Registered norm point {}", point.code());
        }
        Command::NormPointList => {
            for point in qms.registry.list()? {
                let tag = if point.is_mandatory { " (mandatory)" } else { "" };
                println!("- {}{} {}", point.code(), tag, point.requirement_text);
            }
        }
        Command::AuditPlan { title, audit_type, scope, date, lead, points } => {
            let audit = qms.audits.plan(
                PlanAudit {
                    title,
                    audit_type: parse_enum::<AuditType>("audit type", &audit_type)?,
                    scope,
                    planned_date: parse_date(&date)?,
                    lead_auditor: UserId::from_str(lead),
                    norm_point_selection: points,
                },
                &by,
            )?;
            println!(
                "Planned {} covering {} norm points (id {})",
                audit.audit_number,
                audit.selected_norm_points.len(),
                audit.id
            );
        }
        Command::AuditList => {
            for a in qms.audits.list()? {
                println!(
                    "- {} [{:?}] {} planned {} ({}/{} verified)",
                    a.audit_number,
                    a.status,
                    a.title,
                    a.planned_date,
                    a.verifications.len() - a.unverified_count(),
                    a.verifications.len()
                );
            }
        }
        Command::AuditStart { id } => {
            let audit = qms
                .audits
                .start_execution(&AuditId::from_str(id), Utc::now(), &by)?;
            println!("{} is now in progress", audit.audit_number);
        }
        Command::AuditVerify { id, point, verdict, processes, observations } => {
            let audit = qms.audits.record_verification(
                &AuditId::from_str(id),
                RecordVerification {
                    norm_point_code: point.clone(),
                    conformity_status: parse_enum::<ConformityStatus>("conformity code", &verdict)?,
                    processes_checked: processes,
                    observations,
                },
                &by,
            )?;
            println!(
                "Recorded {} for {} ({} points remaining)",
                verdict,
                point,
                audit.unverified_count()
            );
        }
        Command::AuditMeeting { id, closing, attendees, notes } => {
            let input = MeetingInput { held_at: Utc::now(), attendees, notes };
            let audit_id = AuditId::from_str(id);
            if closing {
                qms.audits.record_closing_meeting(&audit_id, input, &by)?;
                println!("Closing meeting recorded");
            } else {
                qms.audits.record_opening_meeting(&audit_id, input, &by)?;
                println!("Opening meeting recorded");
            }
        }
        Command::AuditObserve { id, text } => {
            qms.audits.record_observations(&AuditId::from_str(id), text, &by)?;
            println!("Observations recorded");
        }
        Command::AuditReport { id, delivered_to, notes } => {
            qms.audits.record_report_delivery(
                &AuditId::from_str(id),
                ReportDeliveryInput { delivered_at: Utc::now(), delivered_to, notes },
                &by,
            )?;
            println!("Report delivery recorded");
        }
        Command::AuditCheck { id } => {
            let check = qms.audits.completion_check(&AuditId::from_str(id))?;
            for error in &check.errors {
                println!("error: {error}");
            }
            for warning in &check.warnings {
                println!("warning: {warning}");
            }
            if check.is_blocking() {
                println!("completion is blocked");
            } else {
                println!("ready to complete");
            }
        }
        Command::AuditComplete { id } => {
            let audit = qms.audits.complete(&AuditId::from_str(id), &by)?;
            let conformity = qms.stats.audit_conformity(&audit.id)?;
            println!(
                "{} completed: average conformity {}%, {} non-conformities",
                audit.audit_number, conformity.average_conformity, conformity.non_conformities
            );
        }
        Command::AuditEdit { id, title, scope, date, lead, points } => {
            let audit = qms.audits.edit(
                &AuditId::from_str(id),
                EditAudit {
                    title,
                    scope,
                    planned_date: date.as_deref().map(parse_date).transpose()?,
                    lead_auditor: lead.map(UserId::from_str),
                    norm_point_selection: if points.is_empty() { None } else { Some(points) },
                    observations: None,
                },
                &by,
            )?;
            println!("{} updated", audit.audit_number);
        }
        Command::AuditDelete { id } => {
            qms.audits.delete(&AuditId::from_str(id))?;
            println!("Audit deleted");
        }
        Command::FindingRegister { origin, name, description, source, process } => {
            let finding = qms.findings.register(
                RegisterFinding {
                    origin,
                    name,
                    description,
                    source_type: parse_enum::<SourceType>("source type", &source)?,
                    source_id: None,
                    process_ref: process,
                },
                &by,
            )?;
            println!("Registered {} (id {})", finding.finding_number, finding.id);
        }
        Command::FindingFromAudit { audit, point } => {
            let audit = qms.audits.get(&AuditId::from_str(audit))?;
            let finding = qms.findings.register_from_audit(&audit, &point, &by)?;
            println!(
                "Registered {} from {} point {}",
                finding.finding_number, audit.audit_number, point
            );
        }
        Command::FindingList { status } => {
            let status = status
                .as_deref()
                .map(|s| parse_enum::<FindingStatus>("finding status", s))
                .transpose()?;
            for f in qms.findings.list(status)? {
                println!(
                    "- {} [{}] {}% {}",
                    f.finding_number,
                    f.current_phase(),
                    f.progress,
                    f.registration.name
                );
            }
        }
        Command::FindingPlan { id, responsible, date, comments } => {
            let finding = qms.findings.plan_immediate_action(
                &FindingId::from_str(id),
                PlanImmediateAction {
                    responsible: UserId::from_str(responsible),
                    planned_date: parse_date(&date)?,
                    comments,
                },
                &by,
            )?;
            println!("{} at {}%", finding.finding_number, finding.progress);
        }
        Command::FindingExecute { id, date, correction } => {
            let finding = qms.findings.execute_immediate_action(
                &FindingId::from_str(id),
                ExecuteImmediateAction { executed_on: parse_date(&date)?, correction },
                &by,
            )?;
            println!("{} at {}%", finding.finding_number, finding.progress);
        }
        Command::FindingAnalyze { id, analysis, requires_action } => {
            let finding = qms.findings.analyze_root_cause(
                &FindingId::from_str(id),
                AnalyzeRootCause { analysis, requires_action },
                &by,
            )?;
            println!("{} at {}%", finding.finding_number, finding.progress);
        }
        Command::FindingClose { id } => {
            let finding = qms.findings.close(&FindingId::from_str(id), &by)?;
            println!("{} closed", finding.finding_number);
        }
        Command::ActionAdd { finding, title, description, responsible, date, priority } => {
            let action = qms.actions.create_from_finding(
                CreateAction {
                    finding_id: FindingId::from_str(finding),
                    title,
                    description,
                    responsible: UserId::from_str(responsible),
                    planned_date: parse_date(&date)?,
                    priority: parse_enum::<Priority>("priority", &priority)?,
                    comments: None,
                },
                &by,
            )?;
            println!("Created {} (id {})", action.action_number, action.id);
        }
        Command::ActionList { finding, status } => {
            let status = status
                .as_deref()
                .map(|s| parse_enum::<ActionStatus>("action status", s))
                .transpose()?;
            let views: Vec<_> = match finding {
                Some(finding) => qms
                    .actions
                    .list_for_finding(&FindingId::from_str(finding))?
                    .into_iter()
                    .filter(|v| status.map_or(true, |s| v.action.status == s))
                    .collect(),
                None => qms.actions.list(status)?,
            };
            for v in views {
                let overdue = if v.is_overdue { " OVERDUE" } else { "" };
                println!(
                    "- {} [{:?}]{} {}% due {} {}",
                    v.action.action_number,
                    v.action.status,
                    overdue,
                    v.action.progress_percentage,
                    v.action.planned_date,
                    v.action.title
                );
            }
        }
        Command::ActionStatus { id, status, comment } => {
            let action = qms.actions.update_status(
                &ActionId::from_str(id),
                parse_enum::<ActionStatus>("action status", &status)?,
                comment,
                &by,
            )?;
            println!("{} is now {:?}", action.action_number, action.status);
        }
        Command::ActionProgress { id, percent, comment } => {
            let action = qms
                .actions
                .track_progress(&ActionId::from_str(id), percent, comment, &by)?;
            println!(
                "{} at {}% ({:?})",
                action.action_number, action.progress_percentage, action.status
            );
        }
        Command::ActionVerify { id, effective, date, notes, follow_up } => {
            let verification_date = match date {
                Some(date) => parse_date(&date)?,
                None => Utc::now().date_naive(),
            };
            let action = qms.actions.verify_effectiveness(
                &ActionId::from_str(id),
                VerifyEffectiveness {
                    is_effective: effective,
                    verification_date,
                    notes,
                    follow_up_required: follow_up.is_some(),
                    follow_up_description: follow_up,
                },
                &by,
            )?;
            println!(
                "{} verified: effective = {}",
                action.action_number, effective
            );
        }
        Command::ActionClose { id, evidence } => {
            let action = qms
                .actions
                .close(&ActionId::from_str(id), evidence, None, &by)?;
            println!("{} completed", action.action_number);
        }
        Command::ActionReschedule { id, date } => {
            let action = qms
                .actions
                .reschedule(&ActionId::from_str(id), parse_date(&date)?, &by)?;
            println!("{} rescheduled to {}", action.action_number, action.planned_date);
        }
        Command::RelationAdd { point, subject_type, subject, status, evidence, notes } => {
            let relation = qms.relations.record(
                RecordRelation {
                    norm_point_code: point,
                    subject_type: parse_enum::<SubjectType>("subject type", &subject_type)?,
                    subject_id: subject,
                    compliance_status: parse_enum::<ComplianceStatus>("compliance status", &status)?,
                    evidence,
                    notes,
                },
                &by,
            )?;
            println!("Recorded relation {}", relation.id);
        }
        Command::RelationReclassify { id, status, evidence, notes } => {
            let relation = qms.relations.reclassify(
                &RelationId::from_str(id),
                parse_enum::<ComplianceStatus>("compliance status", &status)?,
                evidence,
                notes,
                &by,
            )?;
            println!("Relation {} reclassified", relation.id);
        }
        Command::RelationDelete { id } => {
            qms.relations.delete(&RelationId::from_str(id))?;
            println!("Relation deleted");
        }
        Command::Matrix => {
            let matrix = qms.relations.matrix()?;
            println!("{}", serde_json::to_string_pretty(&matrix)?);
        }
        Command::Stats { subject } => match subject.as_str() {
            "audits" => println!("{}", serde_json::to_string_pretty(&qms.stats.audit_stats()?)?),
            "findings" => {
                println!("{}", serde_json::to_string_pretty(&qms.stats.finding_stats()?)?)
            }
            "actions" => println!(
                "{}",
                serde_json::to_string_pretty(&qms.stats.action_stats(Utc::now().date_naive())?)?
            ),
            other => anyhow::bail!("unknown stats subject: {other} (audits|findings|actions)"),
        },
        Command::Trends { months } => {
            let buckets = qms.stats.audit_trends(months, Utc::now().date_naive())?;
            println!("{}", serde_json::to_string_pretty(&buckets)?);
        }
    }

    Ok(())
}
