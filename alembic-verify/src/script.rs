//! The migration script directory.
//!
//! Revisions live in `<script_location>/versions/*.sql`, one per file:
//!
//! ```text
//! -- revision: 1975ea83b712
//! -- down_revision: None
//! -- message: create account table
//!
//! -- upgrade
//! CREATE TABLE account (id INTEGER PRIMARY KEY, name VARCHAR(50) NOT NULL);
//!
//! -- downgrade
//! DROP TABLE account;
//! ```
//!
//! `down_revision` holds `None` for a base revision, one id for a regular
//! revision or a comma-separated list for a merge. Two revisions sharing a
//! parent make a branch; the history then has several heads until a merge
//! revision joins them.

use crate::config::Config;
use crate::Error;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

/// A single revision file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    revision: String,
    down_revisions: Vec<String>,
    message: Option<String>,
    upgrade: String,
    downgrade: String,
    path: PathBuf,
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    Header,
    Upgrade,
    Downgrade,
}

impl Script {
    /// Parse the contents of a revision file. `path` is only used in error messages.
    pub fn parse(path: impl Into<PathBuf>, contents: &str) -> Result<Self, Error> {
        let path = path.into();
        let mut headers: HashMap<String, String> = HashMap::new();
        let mut section = Section::Header;
        let mut upgrade = String::new();
        let mut downgrade = String::new();

        for line in contents.lines() {
            let trimmed = line.trim();
            if let Some(comment) = trimmed.strip_prefix("--") {
                let comment = comment.trim();
                if comment.eq_ignore_ascii_case("upgrade") {
                    section = Section::Upgrade;
                    continue;
                }
                if comment.eq_ignore_ascii_case("downgrade") {
                    section = Section::Downgrade;
                    continue;
                }
                if section == Section::Header {
                    if let Some((key, value)) = comment.split_once(':') {
                        headers.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
                    }
                    continue;
                }
            }
            match section {
                Section::Header if trimmed.is_empty() => {}
                Section::Header => {
                    return Err(Error::Script(format!(
                        "{}: SQL found before the '-- upgrade' marker",
                        path.display()
                    )))
                }
                Section::Upgrade => {
                    upgrade.push_str(line);
                    upgrade.push('\n');
                }
                Section::Downgrade => {
                    downgrade.push_str(line);
                    downgrade.push('\n');
                }
            }
        }

        let revision = match headers.get("revision").map(|r| clean_identifier(r)) {
            Some(revision) if !revision.is_empty() => revision,
            _ => {
                return Err(Error::Script(format!(
                    "{}: missing '-- revision:' header",
                    path.display()
                )))
            }
        };
        if revision.contains(|c: char| c.is_whitespace() || c == ',') {
            return Err(Error::Script(format!(
                "{}: invalid revision identifier '{}'",
                path.display(),
                revision
            )));
        }

        let down_revisions = headers
            .get("down_revision")
            .map(|value| {
                value
                    .split(',')
                    .map(clean_identifier)
                    .filter(|id| !id.is_empty() && !id.eq_ignore_ascii_case("none"))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            revision,
            down_revisions,
            message: headers.remove("message").filter(|m| !m.is_empty()),
            upgrade: section_sql(upgrade),
            downgrade: section_sql(downgrade),
            path,
        })
    }

    pub fn revision(&self) -> &str {
        &self.revision
    }

    /// Parent revisions. Empty for a base revision, more than one for a merge.
    pub fn down_revisions(&self) -> &[String] {
        &self.down_revisions
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_base(&self) -> bool {
        self.down_revisions.is_empty()
    }

    pub fn is_merge_point(&self) -> bool {
        self.down_revisions.len() > 1
    }

    /// SQL of the `-- upgrade` section, verbatim. Empty when the section
    /// holds no statements.
    ///
    /// The section is handed to the driver as one batch, so compound
    /// statements (trigger bodies, `$$` functions) keep their semicolons.
    pub fn upgrade_sql(&self) -> &str {
        &self.upgrade
    }

    /// SQL of the `-- downgrade` section, verbatim.
    pub fn downgrade_sql(&self) -> &str {
        &self.downgrade
    }
}

fn clean_identifier(raw: &str) -> String {
    raw.trim_matches(|c: char| c.is_whitespace() || "()[]'\"".contains(c))
        .to_string()
}

/// Section text with nothing but whitespace and `--` comment lines is empty.
fn section_sql(text: String) -> String {
    let has_sql = text.lines().any(|line| {
        let line = line.trim();
        !line.is_empty() && !line.starts_with("--")
    });
    if has_sql {
        text
    } else {
        String::new()
    }
}

/// A read-only view over a migration script folder.
///
/// Scripts are kept in dependency order: every revision comes after all of
/// its parents, ties broken by file name.
#[derive(Debug, Clone)]
pub struct ScriptDirectory {
    dir: PathBuf,
    scripts: Vec<Script>,
    index: HashMap<String, usize>,
}

impl ScriptDirectory {
    /// Load the folder named by the `script_location` option.
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let dir = config.script_location()?;
        if !dir.is_dir() {
            return Err(Error::Config(format!(
                "Path doesn't exist: '{}'. Please create the migration script folder first.",
                dir.display()
            )));
        }
        let versions = dir.join("versions");
        if !versions.is_dir() {
            return Err(Error::Config(format!(
                "Path doesn't exist: '{}'. The script folder must contain a 'versions' directory.",
                versions.display()
            )));
        }

        let mut paths = fs::read_dir(&versions)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<Result<Vec<_>, _>>()?;
        paths.retain(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "sql"));
        paths.sort();

        let scripts = paths
            .into_iter()
            .map(|path| {
                let contents = fs::read_to_string(&path)?;
                Script::parse(path, &contents)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::from_scripts(dir, scripts)
    }

    /// Build a directory from already-parsed scripts, given in load order.
    pub fn from_scripts(dir: impl Into<PathBuf>, scripts: Vec<Script>) -> Result<Self, Error> {
        let dir = dir.into();

        let mut seen: HashMap<&str, &Path> = HashMap::new();
        for script in &scripts {
            if let Some(other) = seen.insert(script.revision(), script.path()) {
                return Err(Error::Script(format!(
                    "Revision {} is present more than once: {} and {}",
                    script.revision(),
                    other.display(),
                    script.path().display()
                )));
            }
        }
        for script in &scripts {
            for parent in script.down_revisions() {
                if !seen.contains_key(parent.as_str()) {
                    return Err(Error::Script(format!(
                        "Revision {} referenced from {} is not present",
                        parent,
                        script.path().display()
                    )));
                }
            }
        }

        let mut remaining: Vec<Option<Script>> = scripts.into_iter().map(Some).collect();
        let mut placed: HashSet<String> = HashSet::new();
        let mut ordered = Vec::with_capacity(remaining.len());
        while ordered.len() < remaining.len() {
            let next = remaining.iter().position(|slot| {
                slot.as_ref().is_some_and(|s| {
                    s.down_revisions().iter().all(|p| placed.contains(p))
                })
            });
            let Some(next) = next else {
                let stuck = remaining
                    .iter()
                    .flatten()
                    .map(|s| s.revision().to_string())
                    .collect::<Vec<_>>();
                return Err(Error::Script(format!(
                    "Cycle detected in revision history involving: {}",
                    stuck.join(", ")
                )));
            };
            if let Some(script) = remaining[next].take() {
                placed.insert(script.revision().to_string());
                ordered.push(script);
            }
        }

        let index = ordered
            .iter()
            .enumerate()
            .map(|(i, s)| (s.revision().to_string(), i))
            .collect();

        Ok(Self {
            dir,
            scripts: ordered,
            index,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn versions_dir(&self) -> PathBuf {
        self.dir.join("versions")
    }

    /// Every revision, parents before children.
    pub fn revisions(&self) -> &[Script] {
        &self.scripts
    }

    /// Look up a revision by id or by an unambiguous id prefix.
    pub fn get_revision(&self, id: &str) -> Result<&Script, Error> {
        if let Some(&i) = self.index.get(id) {
            return Ok(&self.scripts[i]);
        }
        let matches: Vec<&Script> = self
            .scripts
            .iter()
            .filter(|s| !id.is_empty() && s.revision().starts_with(id))
            .collect();
        match matches.as_slice() {
            [script] => Ok(script),
            [] => Err(Error::Command(format!(
                "Can't locate revision identified by '{}'",
                id
            ))),
            many => Err(Error::Command(format!(
                "Multiple revisions start with '{}': {}",
                id,
                many.iter()
                    .map(|s| s.revision())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }

    /// Revisions that no other revision names as a parent.
    pub fn get_heads(&self) -> Vec<String> {
        let parents: HashSet<&str> = self
            .scripts
            .iter()
            .flat_map(|s| s.down_revisions().iter().map(String::as_str))
            .collect();
        self.scripts
            .iter()
            .map(Script::revision)
            .filter(|r| !parents.contains(r))
            .map(str::to_string)
            .collect()
    }

    /// Revisions without a parent.
    pub fn get_bases(&self) -> Vec<String> {
        self.scripts
            .iter()
            .filter(|s| s.is_base())
            .map(|s| s.revision().to_string())
            .collect()
    }

    /// The single head revision, `None` for an empty folder.
    ///
    /// Fails when the history has branched and not been merged.
    pub fn get_current_head(&self) -> Result<Option<String>, Error> {
        let mut heads = self.get_heads();
        match heads.len() {
            0 => Ok(None),
            1 => Ok(heads.pop()),
            _ => Err(Error::Command(format!(
                "The script directory has multiple heads (due to branching): {}. \
                Please specify a revision or use get_heads().",
                heads.join(", ")
            ))),
        }
    }

    /// Direct children of a revision, in dependency order.
    pub fn children(&self, revision: &str) -> Vec<&Script> {
        self.scripts
            .iter()
            .filter(|s| s.down_revisions().iter().any(|p| p == revision))
            .collect()
    }

    /// The given revisions together with all of their ancestors.
    pub fn ancestors<S: AsRef<str>>(&self, revisions: &[S]) -> Result<HashSet<String>, Error> {
        let mut closure = HashSet::new();
        let mut stack: Vec<&str> = revisions.iter().map(AsRef::as_ref).collect();
        while let Some(id) = stack.pop() {
            let Some(&i) = self.index.get(id) else {
                return Err(Error::Command(format!(
                    "Can't locate revision identified by '{}'",
                    id
                )));
            };
            let script = &self.scripts[i];
            if closure.insert(script.revision().to_string()) {
                stack.extend(script.down_revisions().iter().map(String::as_str));
            }
        }
        Ok(closure)
    }

    /// The heads of a set of revisions closed under ancestry, in dependency order.
    pub fn heads_of(&self, revisions: &HashSet<String>) -> Vec<String> {
        let parents: HashSet<&str> = self
            .scripts
            .iter()
            .filter(|s| revisions.contains(s.revision()))
            .flat_map(|s| s.down_revisions().iter().map(String::as_str))
            .collect();
        self.scripts
            .iter()
            .map(Script::revision)
            .filter(|r| revisions.contains(*r) && !parents.contains(r))
            .map(str::to_string)
            .collect()
    }

    /// Follow `steps` children forward from `from` (or from the base when `None`).
    pub fn walk_forward(&self, from: Option<&str>, steps: usize) -> Result<String, Error> {
        let mut at = from.map(str::to_string);
        for _ in 0..steps {
            let next: Vec<&Script> = match &at {
                None => self.scripts.iter().filter(|s| s.is_base()).collect(),
                Some(id) => self.children(id),
            };
            at = match next.as_slice() {
                [script] => Some(script.revision().to_string()),
                [] => {
                    return Err(Error::Command(format!(
                        "Relative revision +{} didn't produce {} migrations",
                        steps, steps
                    )))
                }
                many => {
                    return Err(Error::Command(format!(
                        "Relative revision +{} is ambiguous, the history branches into: {}",
                        steps,
                        many.iter()
                            .map(|s| s.revision())
                            .collect::<Vec<_>>()
                            .join(", ")
                    )))
                }
            };
        }
        at.ok_or_else(|| Error::Command("Relative revision +0 is not a valid target".to_string()))
    }

    /// Follow `steps` parents back from `from`. `None` means the walk ended at the base.
    pub fn walk_back(&self, from: &str, steps: usize) -> Result<Option<String>, Error> {
        let mut at = Some(self.get_revision(from)?.revision().to_string());
        for _ in 0..steps {
            let Some(id) = at else {
                return Err(Error::Command(format!(
                    "Relative revision -{} didn't produce {} migrations",
                    steps, steps
                )));
            };
            let script = self.get_revision(&id)?;
            at = match script.down_revisions() {
                [] => None,
                [parent] => Some(parent.clone()),
                parents => {
                    return Err(Error::Command(format!(
                        "Relative revision -{} is ambiguous, {} merges: {}",
                        steps,
                        id,
                        parents.join(", ")
                    )))
                }
            };
        }
        Ok(at)
    }
}
