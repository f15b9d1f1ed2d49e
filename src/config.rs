//! A minimal typed reader/writer for the git-style `config` file.
//!
//! The on-disk grammar is treated as a collaborator with a known semantic
//! model (per the scope note in the spec this crate implements): sections
//! (optionally with a quoted subsection) containing `key = value` lines.
//! Known sections (`core`, `branch.<name>`, `remote.<name>`) get typed
//! accessors; anything else is reachable through the `(section, subsection,
//! key)` escape hatch.

use crate::error::{Error, Result};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct Section {
    name: String,
    subsection: Option<String>,
    entries: Vec<(String, String)>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Config {
    sections: Vec<Section>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoreConfig {
    pub repository_format_version: u32,
    pub filemode: bool,
    pub bare: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            repository_format_version: 0,
            filemode: false,
            bare: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteConfig {
    pub name: String,
    pub url: String,
    pub fetch: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BranchConfig {
    pub name: String,
    pub remote: Option<String>,
    pub merge: Option<String>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut sections = Vec::new();
        let mut current: Option<Section> = None;
        for raw_line in text.lines() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(rest) = line.strip_prefix('[') {
                let rest = rest
                    .strip_suffix(']')
                    .ok_or_else(|| Error::Corrupt(format!("malformed config section: {raw_line}")))?;
                if let Some((name, quoted)) = rest.split_once(' ') {
                    let sub = quoted
                        .trim()
                        .strip_prefix('"')
                        .and_then(|s| s.strip_suffix('"'))
                        .ok_or_else(|| Error::Corrupt(format!("malformed config subsection: {raw_line}")))?;
                    if let Some(section) = current.take() {
                        sections.push(section);
                    }
                    current = Some(Section {
                        name: name.trim().to_lowercase(),
                        subsection: Some(sub.to_string()),
                        entries: Vec::new(),
                    });
                } else {
                    if let Some(section) = current.take() {
                        sections.push(section);
                    }
                    current = Some(Section {
                        name: rest.trim().to_lowercase(),
                        subsection: None,
                        entries: Vec::new(),
                    });
                }
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| Error::Corrupt(format!("malformed config entry: {raw_line}")))?;
            let section = current
                .as_mut()
                .ok_or_else(|| Error::Corrupt("config entry before any section".into()))?;
            section.entries.push((key.trim().to_lowercase(), value.trim().to_string()));
        }
        if let Some(section) = current.take() {
            sections.push(section);
        }
        Ok(Config { sections })
    }

    pub fn read_file(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(text) => Self::parse(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Config::new()),
            Err(e) => Err(Error::Io(e)),
        }
    }

    pub fn write_file(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_string())?;
        Ok(())
    }

    pub fn get(&self, section: &str, subsection: Option<&str>, key: &str) -> Option<&str> {
        self.section(section, subsection)?
            .entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set(&mut self, section: &str, subsection: Option<&str>, key: &str, value: impl Into<String>) {
        let value = value.into();
        if let Some(s) = self.section_mut(section, subsection) {
            if let Some(entry) = s.entries.iter_mut().find(|(k, _)| k == key) {
                entry.1 = value;
                return;
            }
            s.entries.push((key.to_string(), value));
            return;
        }
        self.sections.push(Section {
            name: section.to_lowercase(),
            subsection: subsection.map(|s| s.to_string()),
            entries: vec![(key.to_string(), value)],
        });
    }

    pub fn has_section(&self, section: &str, subsection: Option<&str>) -> bool {
        self.section(section, subsection).is_some()
    }

    fn section(&self, name: &str, subsection: Option<&str>) -> Option<&Section> {
        self.sections
            .iter()
            .find(|s| s.name == name.to_lowercase() && s.subsection.as_deref() == subsection)
    }

    fn section_mut(&mut self, name: &str, subsection: Option<&str>) -> Option<&mut Section> {
        let name = name.to_lowercase();
        self.sections
            .iter_mut()
            .find(|s| s.name == name && s.subsection.as_deref() == subsection)
    }

    pub fn core(&self) -> CoreConfig {
        let mut core = CoreConfig::default();
        if let Some(v) = self.get("core", None, "repositoryformatversion") {
            core.repository_format_version = v.parse().unwrap_or(0);
        }
        if let Some(v) = self.get("core", None, "filemode") {
            core.filemode = v == "true";
        }
        if let Some(v) = self.get("core", None, "bare") {
            core.bare = v == "true";
        }
        core
    }

    pub fn set_default_core(&mut self) {
        self.set("core", None, "repositoryformatversion", "0");
        self.set("core", None, "filemode", "false");
        self.set("core", None, "bare", "false");
    }

    pub fn remotes(&self) -> Vec<RemoteConfig> {
        self.sections
            .iter()
            .filter(|s| s.name == "remote")
            .filter_map(|s| {
                let name = s.subsection.clone()?;
                let url = s.entries.iter().find(|(k, _)| k == "url")?.1.clone();
                let fetch = s
                    .entries
                    .iter()
                    .find(|(k, _)| k == "fetch")
                    .map(|(_, v)| v.clone())
                    .unwrap_or_default();
                Some(RemoteConfig { name, url, fetch })
            })
            .collect()
    }

    pub fn remote(&self, name: &str) -> Option<RemoteConfig> {
        self.remotes().into_iter().find(|r| r.name == name)
    }

    pub fn add_remote(&mut self, name: &str, url: &str) -> Result<()> {
        if self.has_section("remote", Some(name)) {
            return Err(Error::Conflict(format!("remote {name} already exists")));
        }
        self.set("remote", Some(name), "url", url);
        self.set("remote", Some(name), "fetch", format!("+refs/heads/*:refs/remotes/{name}/*"));
        Ok(())
    }

    pub fn branch(&self, name: &str) -> Option<BranchConfig> {
        let section = self.section("branch", Some(name))?;
        Some(BranchConfig {
            name: name.to_string(),
            remote: section.entries.iter().find(|(k, _)| k == "remote").map(|(_, v)| v.clone()),
            merge: section.entries.iter().find(|(k, _)| k == "merge").map(|(_, v)| v.clone()),
        })
    }

    pub fn set_branch_upstream(&mut self, name: &str, remote: &str, merge_ref: &str) {
        self.set("branch", Some(name), "remote", remote);
        self.set("branch", Some(name), "merge", merge_ref);
    }
}

impl std::fmt::Display for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for section in &self.sections {
            match &section.subsection {
                Some(sub) => writeln!(f, "[{} \"{}\"]", section.name, sub)?,
                None => writeln!(f, "[{}]", section.name)?,
            }
            for (k, v) in &section.entries {
                let mut line = String::new();
                write!(line, "\t{k} = {v}").ok();
                writeln!(f, "{line}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_core_matches_init_layout() {
        let mut config = Config::new();
        config.set_default_core();
        let core = config.core();
        assert_eq!(core.repository_format_version, 0);
        assert!(!core.filemode);
        assert!(!core.bare);
    }

    #[test]
    fn parses_sections_and_subsections() {
        let text = "[core]\n\trepositoryformatversion = 0\n\tfilemode = false\n\tbare = false\n[remote \"origin\"]\n\turl = u\n\tfetch = +refs/heads/*:refs/remotes/origin/*\n";
        let config = Config::parse(text).unwrap();
        assert_eq!(config.core(), CoreConfig::default());
        let origin = config.remote("origin").unwrap();
        assert_eq!(origin.url, "u");
        assert_eq!(origin.fetch, "+refs/heads/*:refs/remotes/origin/*");
    }

    #[test]
    fn add_remote_conflicts_on_duplicate_name() {
        let mut config = Config::new();
        config.add_remote("origin", "u").unwrap();
        assert!(matches!(config.add_remote("origin", "other"), Err(Error::Conflict(_))));
    }

    #[test]
    fn branch_upstream_roundtrips_through_text() {
        let mut config = Config::new();
        config.set_branch_upstream("master", "origin", "refs/heads/master");
        let text = config.to_string();
        let reparsed = Config::parse(&text).unwrap();
        let branch = reparsed.branch("master").unwrap();
        assert_eq!(branch.remote.as_deref(), Some("origin"));
        assert_eq!(branch.merge.as_deref(), Some("refs/heads/master"));
    }
}
