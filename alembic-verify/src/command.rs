//! Migration commands: `upgrade`, `downgrade`, `stamp` and `history`.
//!
//! Every command reads the scripts and the database URL from a [Config],
//! opens one connection, and closes it before returning.

use crate::config::Config;
use crate::engine::{create_engine, Connection, Engine};
use crate::migration::{EnvironmentContext, MigrationContext};
use crate::revision::VERSION_TABLE;
use crate::script::{Script, ScriptDirectory};
use crate::Error;
use std::fmt;
use std::str::FromStr;
#[cfg(feature = "tracing")]
use std::time::Instant;

/// Where a command should take the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// The single head of the history.
    Head,
    /// Every head of a branched history.
    Heads,
    /// Nothing applied.
    Base,
    /// `+N` or `-N` steps from the single current revision.
    Relative(i32),
    /// A revision id or unambiguous id prefix.
    Revision(String),
}

impl FromStr for Target {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "" => Err(Error::Command("No revision target given".to_string())),
            "head" => Ok(Self::Head),
            "heads" => Ok(Self::Heads),
            "base" => Ok(Self::Base),
            _ if s.starts_with('+') || s.starts_with('-') => match s.parse::<i32>() {
                Ok(0) | Err(_) => Err(Error::Command(format!(
                    "Invalid relative revision '{}'",
                    s
                ))),
                Ok(steps) => Ok(Self::Relative(steps)),
            },
            _ => Ok(Self::Revision(s.to_string())),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Head => f.write_str("head"),
            Self::Heads => f.write_str("heads"),
            Self::Base => f.write_str("base"),
            Self::Relative(steps) => write!(f, "{:+}", steps),
            Self::Revision(id) => f.write_str(id),
        }
    }
}

/// A report of actions performed by [upgrade] or [downgrade].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub version_table_existed: bool,
    pub version_table_created: bool,
    /// Revisions upgraded or downgraded, in the order they ran.
    pub revisions_run: Vec<String>,
}

fn load(config: &Config) -> Result<(ScriptDirectory, Engine), Error> {
    let script = ScriptDirectory::from_config(config)?;
    let engine = create_engine(config.url()?)?;
    Ok((script, engine))
}

fn single_current<'h>(heads: &'h [String], target: &Target) -> Result<Option<&'h str>, Error> {
    match heads {
        [] => Ok(None),
        [head] => Ok(Some(head.as_str())),
        _ => Err(Error::Command(format!(
            "Relative revision {} is ambiguous with multiple current heads: {}",
            target,
            heads.join(", ")
        ))),
    }
}

/// Upgrade the database named in `config` to `target`.
///
/// Every revision in the ancestry of the target that is not yet applied
/// runs, parents before children.
pub fn upgrade(config: &Config, target: &str) -> Result<MigrationReport, Error> {
    let target: Target = target.parse()?;
    let (script, engine) = load(config)?;
    let env = EnvironmentContext::new(config, &script)?;
    let mut conn = engine.connect()?;
    let mut context = env.configure(&mut conn, VERSION_TABLE);

    let version_table_existed = context.version_table_exists()?;
    let current = context.get_current_heads()?;
    let mut applied = script.ancestors(&current)?;

    let destination: Vec<String> = match &target {
        Target::Head => script.get_current_head()?.into_iter().collect(),
        Target::Heads => script.get_heads(),
        Target::Base => {
            return Err(Error::Command(
                "Can't upgrade to 'base'; use downgrade instead".to_string(),
            ))
        }
        Target::Relative(steps) if *steps < 0 => {
            return Err(Error::Command(format!(
                "Can't upgrade to relative revision {}; use downgrade instead",
                target
            )))
        }
        Target::Relative(steps) => {
            let from = single_current(&current, &target)?;
            vec![script.walk_forward(from, *steps as usize)?]
        }
        Target::Revision(id) => {
            let revision = script.get_revision(id)?.revision().to_string();
            // Already behind a current head: reaching it means going down.
            if applied.contains(&revision) && !current.contains(&revision) {
                return Err(Error::Command(format!(
                    "Destination {} is not a valid upgrade target from current heads: {}",
                    revision,
                    current.join(", ")
                )));
            }
            vec![revision]
        }
    };

    let wanted = script.ancestors(&destination)?;
    let plan: Vec<&Script> = script
        .revisions()
        .iter()
        .filter(|s| wanted.contains(s.revision()) && !applied.contains(s.revision()))
        .collect();

    #[cfg(feature = "tracing")]
    tracing::debug!(
        target_revision = %target,
        current_heads = ?current,
        plan = ?plan.iter().map(|s| s.revision()).collect::<Vec<_>>(),
        "Computed upgrade plan"
    );

    let version_table_created = context.ensure_version_table()?;
    let mut report = MigrationReport {
        version_table_existed,
        version_table_created,
        revisions_run: Vec::with_capacity(plan.len()),
    };

    for revision in plan {
        applied.insert(revision.revision().to_string());
        let heads = script.heads_of(&applied);
        run_revision(
            &mut context,
            revision,
            revision.upgrade_sql(),
            &heads,
            "upgrade",
        )?;
        report.revisions_run.push(revision.revision().to_string());
    }

    Ok(report)
}

/// Downgrade the database named in `config` to `target`.
///
/// Every applied revision that is not an ancestor of the target is
/// reverted, children before parents.
pub fn downgrade(config: &Config, target: &str) -> Result<MigrationReport, Error> {
    let target: Target = target.parse()?;
    let (script, engine) = load(config)?;
    let env = EnvironmentContext::new(config, &script)?;
    let mut conn = engine.connect()?;
    let mut context = env.configure(&mut conn, VERSION_TABLE);

    let version_table_existed = context.version_table_exists()?;
    let current = context.get_current_heads()?;
    let mut applied = script.ancestors(&current)?;

    let destination: Vec<String> = match &target {
        Target::Base => Vec::new(),
        Target::Relative(steps) if *steps < 0 => {
            let Some(from) = single_current(&current, &target)? else {
                return Err(Error::Command(format!(
                    "Relative revision {} didn't produce {} migrations",
                    target,
                    steps.unsigned_abs()
                )));
            };
            script
                .walk_back(from, steps.unsigned_abs() as usize)?
                .into_iter()
                .collect()
        }
        Target::Revision(id) => {
            let revision = script.get_revision(id)?.revision().to_string();
            if !applied.contains(&revision) {
                return Err(Error::Command(format!(
                    "Destination {} is not a valid downgrade target from current heads: {}",
                    revision,
                    current.join(", ")
                )));
            }
            vec![revision]
        }
        Target::Head | Target::Heads | Target::Relative(_) => {
            return Err(Error::Command(format!(
                "Can't downgrade to '{}'; use upgrade instead",
                target
            )))
        }
    };

    let wanted = script.ancestors(&destination)?;
    let plan: Vec<&Script> = script
        .revisions()
        .iter()
        .rev()
        .filter(|s| applied.contains(s.revision()) && !wanted.contains(s.revision()))
        .collect();

    #[cfg(feature = "tracing")]
    tracing::debug!(
        target_revision = %target,
        current_heads = ?current,
        plan = ?plan.iter().map(|s| s.revision()).collect::<Vec<_>>(),
        "Computed downgrade plan"
    );

    let mut report = MigrationReport {
        version_table_existed,
        version_table_created: false,
        revisions_run: Vec::with_capacity(plan.len()),
    };

    for revision in plan {
        applied.remove(revision.revision());
        let heads = script.heads_of(&applied);
        run_revision(
            &mut context,
            revision,
            revision.downgrade_sql(),
            &heads,
            "downgrade",
        )?;
        report.revisions_run.push(revision.revision().to_string());
    }

    Ok(report)
}

fn run_revision(
    context: &mut MigrationContext<'_>,
    revision: &Script,
    sql: &str,
    heads: &[String],
    direction: &'static str,
) -> Result<(), Error> {
    #[cfg(feature = "tracing")]
    let _span = tracing::info_span!(
        "revision",
        direction,
        revision = %revision.revision(),
        description = revision.message().unwrap_or_default()
    )
    .entered();
    #[cfg(feature = "tracing")]
    let started = Instant::now();
    #[cfg(feature = "tracing")]
    tracing::info!("Running revision");
    #[cfg(not(feature = "tracing"))]
    let _ = (revision, direction);

    match context.run_step(sql, heads) {
        Ok(()) => {
            #[cfg(feature = "tracing")]
            tracing::info!(
                duration_ms = started.elapsed().as_millis(),
                heads = ?heads,
                "Revision completed successfully"
            );
            Ok(())
        }
        Err(e) => {
            #[cfg(feature = "tracing")]
            tracing::error!(error = %e, "Revision failed");
            Err(e)
        }
    }
}

/// Point the version table at `target` without running any SQL.
pub fn stamp(config: &Config, target: &str) -> Result<(), Error> {
    let target: Target = target.parse()?;
    let (script, engine) = load(config)?;
    let env = EnvironmentContext::new(config, &script)?;

    let destination: Vec<String> = match &target {
        Target::Head => script.get_current_head()?.into_iter().collect(),
        Target::Heads => script.get_heads(),
        Target::Base => Vec::new(),
        Target::Revision(id) => vec![script.get_revision(id)?.revision().to_string()],
        Target::Relative(_) => {
            return Err(Error::Command(format!(
                "Relative revision {} can't be stamped",
                target
            )))
        }
    };
    let heads = script.heads_of(&script.ancestors(&destination)?);

    let mut conn: Connection = engine.connect()?;
    let mut context = env.configure(&mut conn, VERSION_TABLE);
    context.ensure_version_table()?;
    context.stamp(&heads)?;

    #[cfg(feature = "tracing")]
    tracing::info!(heads = ?heads, "Stamped version table");
    Ok(())
}

/// Every revision in the script folder, parents before children.
pub fn history(config: &Config) -> Result<Vec<Script>, Error> {
    Ok(ScriptDirectory::from_config(config)?.revisions().to_vec())
}

/// Apply migrations up to `revision` (normally `"head"` or `"+1"`).
///
/// The migrations run against the URL in `config`; the returned engine
/// points at `uri`.
pub fn prepare_schema_from_migrations(
    uri: &str,
    config: &Config,
    revision: &str,
) -> Result<(Engine, ScriptDirectory), Error> {
    let engine = create_engine(uri)?;
    let script = ScriptDirectory::from_config(config)?;
    upgrade(config, revision)?;
    Ok((engine, script))
}
