//! CLI entry point (§4.13, §6 CLI surface). The sole `std::process::exit` call
//! site in the crate: every other function returns a `Result` and lets this
//! `main` translate the final error into the documented exit-code taxonomy.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::{error, info, warn};

use swesmith::collector;
use swesmith::config::{EnvConfig, OwnerType, PipelineConfig};
use swesmith::dataset;
use swesmith::entity::{self, LanguageAdapter};
use swesmith::env::EnvironmentBuilder;
use swesmith::errors::SmithError;
use swesmith::gatherer;
use swesmith::generators::llm_modify::LmModifyGenerator;
use swesmith::generators::llm_rewrite::LmRewriteGenerator;
use swesmith::generators::procedural::ProceduralGenerator;
use swesmith::generators::{BugGenerator, CandidatePatch};
use swesmith::issue::{self, IssueMode};
use swesmith::llm::{LlmClient, TokenPool};
use swesmith::profile::RepoProfile;
use swesmith::validator::container::{ContainerRuntime, DockerCli};
use swesmith::validator::Validator;

#[derive(Parser, Debug)]
#[command(name = "swesmith", about = "Synthesizes reproducible software-engineering task instances from a pinned repository.")]
struct Cli {
    /// Path to one or more repo profile TOML documents.
    #[arg(long)]
    profile: PathBuf,

    /// Which bug generator(s) to run.
    #[arg(long, value_enum, default_value_t = BugGenMethod::Procedural)]
    bug_gen_method: BugGenMethod,

    /// Maximum candidate bugs to keep per repo.
    #[arg(long, default_value_t = 100)]
    max_bugs: usize,

    /// Worker pool size for the validator.
    #[arg(long)]
    workers: Option<usize>,

    /// How problem statements are produced.
    #[arg(long, value_enum, default_value_t = IssueModeArg::Static)]
    issue_mode: IssueModeArg,

    /// Optional override config for the issue generator.
    #[arg(long)]
    issue_config: Option<PathBuf>,

    /// Worker pool size for the issue generator.
    #[arg(long, default_value_t = 4)]
    issue_workers: usize,

    /// Chat-completions model name, required for llm/llm-modify/llm-rewrite modes.
    #[arg(long)]
    llm_model: Option<String>,

    /// Skip building the container image (assume it already exists).
    #[arg(long, default_value_t = false)]
    skip_build: bool,

    /// Whether the mirror namespace is a user or an organization.
    #[arg(long, value_enum)]
    gh_owner_type: Option<OwnerTypeArg>,

    /// Path to a pipeline config TOML file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Raise log verbosity; repeatable (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum BugGenMethod {
    Procedural,
    LlmModify,
    LlmRewrite,
    All,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum IssueModeArg {
    Llm,
    Static,
    Tests,
    Pr,
    Skip,
}

impl From<IssueModeArg> for IssueMode {
    fn from(value: IssueModeArg) -> Self {
        match value {
            IssueModeArg::Llm => IssueMode::Llm,
            IssueModeArg::Static => IssueMode::Static,
            IssueModeArg::Tests => IssueMode::Tests,
            IssueModeArg::Pr => IssueMode::Pr,
            IssueModeArg::Skip => IssueMode::Skip,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OwnerTypeArg {
    User,
    Org,
}

fn main() {
    let cli = Cli::parse();
    swesmith::init_tracing(cli.verbose > 0);

    if let Err(err) = run(cli) {
        error!(%err, "pipeline run failed");
        std::process::exit(err.exit_code());
    }
}

fn run(cli: Cli) -> Result<(), SmithError> {
    let pipeline_config = PipelineConfig::load(cli.config.as_deref())?;
    let mut env_config = EnvConfig::from_env()?;
    if let Some(owner_type) = cli.gh_owner_type {
        env_config.gh_owner_type = match owner_type {
            OwnerTypeArg::User => OwnerType::User,
            OwnerTypeArg::Org => OwnerType::Org,
        };
    }

    let workers = cli.workers.unwrap_or(pipeline_config.workers);
    let workspace = std::env::current_dir()?;

    let profile_text = std::fs::read_to_string(&cli.profile)?;
    let profiles = RepoProfile::load_all(&profile_text)?;

    let llm_client = build_llm_client(&cli, &pipeline_config, &env_config)?;

    let runtime: Arc<dyn ContainerRuntime> =
        Arc::new(DockerCli::new(env_config.https_proxy.clone(), env_config.no_proxy.clone()));
    let validator = Validator::new(Arc::clone(&runtime), workers);

    let mut any_instance = false;

    for profile in &profiles {
        info!(repo = %profile.repo, "starting pipeline for repo");

        let env_handle = if cli.skip_build {
            swesmith::env::EnvironmentHandle {
                mirror_name: profile.mirror_name(&env_config.gh_org),
                image_name: profile.image_name(&env_config.dh_org, std::env::consts::ARCH),
            }
        } else {
            let builder = EnvironmentBuilder::new(&env_config, &pipeline_config);
            builder.build(profile, &workspace)?
        };

        let source_files = entity::gather_source_tree(&workspace, profile)?;
        let adapter = LanguageAdapter::for_language(profile.language());
        let entities = adapter.entities_of(&source_files)?;

        let candidates = generate_candidates(&cli, profile, &entities, llm_client.as_ref())?;

        let bug_gen_dir = profile.bug_gen_dir(&workspace);
        for candidate in &candidates {
            candidate.write_to(&bug_gen_dir)?;
        }
        let manifest = collector::collect(&bug_gen_dir)?;
        collector::write_manifest(&manifest, &workspace.join("logs/bug_gen"), &profile.repo)?;

        let gold = validator.gold_report(profile, &env_handle.image_name)?;
        let outcomes = validator.validate_all(profile, &env_handle.image_name, &gold, candidates.clone());

        let instances = gatherer::gather(profile, &env_handle.image_name, &candidates, &outcomes);
        if instances.is_empty() {
            warn!(repo = %profile.repo, "no promotable instances produced");
            continue;
        }
        any_instance = true;

        {
            let mut locks = gatherer::MirrorPushLock::new();
            let lock = locks.for_mirror(&env_handle.mirror_name);
            let _guard = lock.lock().unwrap();
            for instance in &instances {
                gatherer::push_instance_branch(&env_handle.mirror_name, instance, &workspace)?;
            }
        }

        let issue_mode: IssueMode = cli.issue_mode.into();
        let mut issues = Vec::with_capacity(instances.len());
        for instance in &instances {
            if let Some(record) = issue::generate(instance, issue_mode, llm_client.as_ref())? {
                issues.push(record);
            }
        }
        issue::write_records(&issues, &issue::canonical_issue_path(&workspace, &profile.repo, "swesmith"))?;

        let records = dataset::assemble(&instances, &issues, issue_mode)?;
        let path = dataset::write_dataset(&records, &workspace, &profile.repo)?;
        info!(repo = %profile.repo, instances = records.len(), path = %path.display(), "dataset written");
    }

    if !any_instance {
        return Err(SmithError::NoPredictions);
    }
    Ok(())
}

fn build_llm_client(cli: &Cli, pipeline_config: &PipelineConfig, env_config: &EnvConfig) -> Result<Option<LlmClient>, SmithError> {
    let needs_llm = matches!(cli.bug_gen_method, BugGenMethod::LlmModify | BugGenMethod::LlmRewrite | BugGenMethod::All)
        || matches!(cli.issue_mode, IssueModeArg::Llm);
    if !needs_llm {
        return Ok(None);
    }
    let model = cli
        .llm_model
        .clone()
        .ok_or_else(|| SmithError::Configuration("--llm-model is required for the selected bug-gen-method/issue-mode".into()))?;
    let tokens = TokenPool::new(env_config.llm_api_keys.clone());
    let client = LlmClient::new(
        "https://api.openai.com/v1".to_string(),
        model,
        tokens,
        pipeline_config.backoff.clone(),
        std::time::Duration::from_secs(pipeline_config.llm_timeout_secs),
    )?;
    Ok(Some(client))
}

fn generate_candidates(
    cli: &Cli,
    profile: &RepoProfile,
    entities: &[entity::CodeEntity],
    llm_client: Option<&LlmClient>,
) -> Result<Vec<CandidatePatch>, SmithError> {
    let _ = profile;
    let mut out = Vec::new();

    let run_procedural = matches!(cli.bug_gen_method, BugGenMethod::Procedural | BugGenMethod::All);
    let run_llm_modify = matches!(cli.bug_gen_method, BugGenMethod::LlmModify | BugGenMethod::All);
    let run_llm_rewrite = matches!(cli.bug_gen_method, BugGenMethod::LlmRewrite | BugGenMethod::All);

    if run_procedural {
        out.extend(ProceduralGenerator.generate(entities, cli.max_bugs)?);
    }
    if run_llm_modify || run_llm_rewrite {
        let client = llm_client
            .ok_or_else(|| SmithError::Configuration("llm-modify/llm-rewrite requires --llm-model".into()))?;
        if run_llm_modify {
            out.extend(LmModifyGenerator { client }.generate(entities, cli.max_bugs)?);
        }
        if run_llm_rewrite {
            out.extend(LmRewriteGenerator { client }.generate(entities, cli.max_bugs)?);
        }
    }

    out.truncate(cli.max_bugs);
    Ok(out)
}
