//! Revision inspection helpers.
//!
//! These answer "where is this database?" and "where do the scripts end?"
//! for a test that has just run migrations. Each call opens one connection
//! and one environment context, and releases both before returning, also
//! on failure.

use crate::config::Config;
use crate::engine::Engine;
use crate::migration::EnvironmentContext;
use crate::script::ScriptDirectory;
use crate::Error;

/// Name of the table that records the applied heads.
pub const VERSION_TABLE: &str = "alembic_version";

/// Which revision to look up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RevisionType {
    /// What the database says has been applied.
    #[default]
    Current,
    /// The latest revision defined by the scripts.
    Head,
}

/// The lookup performed by [resolve_revision].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevisionMode {
    /// The single current revision. Assumes a linear history.
    Current,
    /// The head of the script directory.
    Head,
    /// Every current head; safe with branching histories.
    CurrentAll,
}

/// Result of a revision lookup: one (possibly absent) id, or a list of heads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Revision {
    Single(Option<String>),
    Multiple(Vec<String>),
}

impl Revision {
    /// The id of a [Revision::Single] result, `None` otherwise or when empty.
    pub fn as_single(&self) -> Option<&str> {
        match self {
            Self::Single(id) => id.as_deref(),
            Self::Multiple(_) => None,
        }
    }

    /// Every id in the result, in lookup order.
    pub fn ids(&self) -> Vec<&str> {
        match self {
            Self::Single(id) => id.as_deref().into_iter().collect(),
            Self::Multiple(ids) => ids.iter().map(String::as_str).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Single(id) => id.is_none(),
            Self::Multiple(ids) => ids.is_empty(),
        }
    }
}

/// Look up a revision in the given mode.
pub fn resolve_revision(
    config: &Config,
    engine: &Engine,
    script: &ScriptDirectory,
    mode: RevisionMode,
) -> Result<Revision, Error> {
    match mode {
        RevisionMode::Current => get_revision(config, engine, script, RevisionType::Current, false),
        RevisionMode::Head => get_revision(config, engine, script, RevisionType::Head, false),
        RevisionMode::CurrentAll => {
            get_revision(config, engine, script, RevisionType::Current, true)
        }
    }
}

/// The current revision of the database, `None` if nothing has been applied.
///
/// Fails with a command error when the database has several heads; use
/// [get_current_revisions] with branching histories.
pub fn get_current_revision(
    config: &Config,
    engine: &Engine,
    script: &ScriptDirectory,
) -> Result<Option<String>, Error> {
    Ok(resolve_revision(config, engine, script, RevisionMode::Current)?
        .as_single()
        .map(str::to_string))
}

/// The head revision of the scripts, `None` for an empty script folder.
pub fn get_head_revision(
    config: &Config,
    engine: &Engine,
    script: &ScriptDirectory,
) -> Result<Option<String>, Error> {
    Ok(resolve_revision(config, engine, script, RevisionMode::Head)?
        .as_single()
        .map(str::to_string))
}

/// Every current head of the database. Safe with branching histories.
///
/// One element when the history has not branched at the current revision,
/// empty when nothing has been applied. Compare as a set: the order is
/// whatever the version table returns.
pub fn get_current_revisions(
    config: &Config,
    engine: &Engine,
    script: &ScriptDirectory,
) -> Result<Vec<String>, Error> {
    match resolve_revision(config, engine, script, RevisionMode::CurrentAll)? {
        Revision::Multiple(ids) => Ok(ids),
        Revision::Single(id) => Ok(id.into_iter().collect()),
    }
}

fn get_revision(
    config: &Config,
    engine: &Engine,
    script: &ScriptDirectory,
    revision_type: RevisionType,
    handle_branching: bool,
) -> Result<Revision, Error> {
    let mut conn = engine.connect()?;
    let env = EnvironmentContext::new(config, script)?;
    let mut context = env.configure(&mut conn, VERSION_TABLE);

    match (revision_type, handle_branching) {
        (RevisionType::Head, _) => Ok(Revision::Single(env.get_head_revision()?)),
        (RevisionType::Current, true) => Ok(Revision::Multiple(context.get_current_heads()?)),
        (RevisionType::Current, false) => Ok(Revision::Single(context.get_current_revision()?)),
    }
}
