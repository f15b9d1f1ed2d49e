//! Thin CLI shell over the `rudiment` library. Argument parsing, terminal
//! output, and `.gitconfig` text reading live here; everything else
//! delegates straight to the library.

use anyhow::{Context, Result, bail};
use chrono::Local;
use clap::{Parser, Subcommand};
use rudiment::{CommitOptions, Hash, Object, ObjectKind, Repository, Signature};
use std::env;
use std::fs::File;
use std::io::{BufRead, BufReader, Write, stdout};
use std::path::PathBuf;

#[derive(Parser, Debug)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create the `.git` directory layout in the current directory.
    Init,
    CatFile {
        #[clap(short = 'p')]
        pretty_print: bool,
        hash: String,
    },
    HashObject {
        #[clap(short = 'w')]
        write: bool,
        file: PathBuf,
    },
    LsTree {
        #[clap(long)]
        name_only: bool,
        tree_hash: String,
    },
    /// Write the current index as a tree, printing the root hash.
    WriteTree,
    CommitTree {
        #[clap(short = 'm')]
        message: String,
        #[clap(short = 'p')]
        parent_hash: Option<String>,
        tree_hash: String,
    },
    /// Stage the whole work tree and commit it onto the current branch.
    Commit {
        #[clap(short = 'm')]
        message: String,
    },
    /// Stage one or more paths (files or directories) into the index.
    Add { paths: Vec<PathBuf> },
    Branch {
        name: String,
        start_point: Option<String>,
    },
    Remote {
        #[command(subcommand)]
        action: RemoteAction,
    },
    Log {
        #[clap(long)]
        oneline: bool,
    },
}

#[derive(Debug, Subcommand)]
enum RemoteAction {
    Add { name: String, url: String },
}

fn main() -> Result<()> {
    let args = Args::parse();
    match args.command {
        Command::Init => {
            Repository::init(".").context("initializing repository")?;
        }
        Command::CatFile { pretty_print, hash } => cat_file(pretty_print, &hash)?,
        Command::HashObject { write, file } => hash_object(write, &file)?,
        Command::LsTree { name_only, tree_hash } => ls_tree(name_only, &tree_hash)?,
        Command::WriteTree => {
            let repo = Repository::open(".").context("opening repository")?;
            let index = repo.read_index().context("reading index")?;
            let hash = repo.write_tree(&index).context("writing tree")?;
            println!("{hash}");
        }
        Command::CommitTree {
            message,
            parent_hash,
            tree_hash,
        } => commit_tree(&tree_hash, parent_hash.as_deref(), &message)?,
        Command::Commit { message } => {
            let repo = Repository::open(".").context("opening repository")?;
            let author = signature_from_gitconfig()?;
            let hash = repo
                .commit(CommitOptions {
                    message,
                    author,
                    committer: None,
                    auto_stage: true,
                })
                .context("committing")?;
            println!("{hash}");
        }
        Command::Add { paths } => add(&paths)?,
        Command::Branch { name, start_point } => {
            let repo = Repository::open(".").context("opening repository")?;
            repo.create_branch(&name, start_point.as_deref())
                .context("creating branch")?;
        }
        Command::Remote {
            action: RemoteAction::Add { name, url },
        } => {
            let repo = Repository::open(".").context("opening repository")?;
            repo.add_remote(&name, &url).context("adding remote")?;
        }
        Command::Log { oneline } => log(oneline)?,
    }
    Ok(())
}

fn cat_file(pretty_print: bool, hash: &str) -> Result<()> {
    if !pretty_print {
        bail!("-p must be passed; raw `-t`/`-s` output is not supported");
    }
    let repo = Repository::open(".").context("opening repository")?;
    let hash = Hash::parse_hex(hash).context("parsing object hash")?;
    let object = repo.objects().read(&hash).context("reading object")?;
    let mut out = stdout().lock();
    match object {
        Object::Blob(bytes) => out.write_all(&bytes)?,
        Object::Tree(leaves) => {
            for leaf in &leaves {
                let kind = if leaf.mode.is_directory() { ObjectKind::Tree } else { ObjectKind::Blob };
                writeln!(out, "{:0>6} {} {}    {}", leaf.mode.to_mode_str(), kind, leaf.hash, leaf.name)?;
            }
        }
        Object::Commit(commit) => {
            writeln!(out, "tree {}", commit.tree)?;
            for parent in &commit.parents {
                writeln!(out, "parent {parent}")?;
            }
            writeln!(out, "author {} <{}> {}", commit.author.name, commit.author.email, commit.author.timestamp)?;
            writeln!(out, "committer {} <{}> {}", commit.committer.name, commit.committer.email, commit.committer.timestamp)?;
            writeln!(out)?;
            out.write_all(&commit.message)?;
        }
        Object::Tag(tag) => {
            writeln!(out, "object {}", tag.object)?;
            writeln!(out, "type {}", tag.object_kind)?;
            writeln!(out, "tag {}", tag.tag_name)?;
            writeln!(out, "tagger {} <{}> {}", tag.tagger.name, tag.tagger.email, tag.tagger.timestamp)?;
            writeln!(out)?;
            out.write_all(&tag.message)?;
        }
    }
    Ok(())
}

fn hash_object(write: bool, file: &std::path::Path) -> Result<()> {
    let bytes = std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    let object = Object::Blob(bytes);
    let hash = if write {
        let repo = Repository::open(".").context("opening repository")?;
        repo.objects().write(&object).context("writing blob")?
    } else {
        object.hash()
    };
    println!("{hash}");
    Ok(())
}

fn ls_tree(name_only: bool, tree_hash: &str) -> Result<()> {
    let repo = Repository::open(".").context("opening repository")?;
    let hash = Hash::parse_hex(tree_hash).context("parsing tree hash")?;
    let Object::Tree(leaves) = repo.objects().read(&hash).context("reading tree")? else {
        bail!("not a tree object");
    };
    let mut out = stdout().lock();
    for leaf in &leaves {
        if name_only {
            writeln!(out, "{}", leaf.name)?;
        } else {
            let kind = if leaf.mode.is_directory() { ObjectKind::Tree } else { ObjectKind::Blob };
            writeln!(out, "{:0>6} {} {}    {}", leaf.mode.to_mode_str(), kind, leaf.hash, leaf.name)?;
        }
    }
    Ok(())
}

fn commit_tree(tree_hash: &str, parent_hash: Option<&str>, message: &str) -> Result<()> {
    let repo = Repository::open(".").context("opening repository")?;
    let tree = Hash::parse_hex(tree_hash).context("parsing tree hash")?;
    let parents = parent_hash
        .map(|p| Hash::parse_hex(p).context("parsing parent hash"))
        .transpose()?
        .into_iter()
        .collect();
    let author = signature_from_gitconfig()?;
    let commit = rudiment::Commit {
        tree,
        parents,
        author: author.clone(),
        committer: author,
        gpgsig: None,
        message: message.as_bytes().to_vec(),
    };
    let hash = repo.objects().write(&Object::Commit(commit)).context("writing commit")?;
    println!("{hash}");
    Ok(())
}

fn add(paths: &[PathBuf]) -> Result<()> {
    let repo = Repository::open(".").context("opening repository")?;
    let mut index = repo.read_index().context("reading index")?;
    for path in paths {
        let absolute = if path.is_absolute() { path.clone() } else { std::env::current_dir()?.join(path) };
        if absolute.is_dir() {
            repo.add_directory(&mut index, &absolute, true)
                .with_context(|| format!("adding directory {}", path.display()))?;
        } else {
            repo.add_file(&mut index, &absolute)
                .with_context(|| format!("adding file {}", path.display()))?;
        }
    }
    repo.write_index(&index).context("writing index")?;
    Ok(())
}

fn log(oneline: bool) -> Result<()> {
    let repo = Repository::open(".").context("opening repository")?;
    let ahead = repo.num_changes_to_push().context("computing ahead count")?;
    let branch = repo.current_branch()?.unwrap_or_else(|| "HEAD".to_string());
    if oneline {
        println!("{branch} {ahead} commit(s) ahead of upstream");
    } else {
        println!("branch: {branch}");
        println!("ahead of upstream: {ahead}");
    }
    Ok(())
}

/// Reads `name`/`email` out of `~/.gitconfig`'s `[user]` section and pairs
/// them with the current local time, the way the teacher's `commit.rs` did.
fn signature_from_gitconfig() -> Result<Signature> {
    let mut path = env::home_dir().context("couldn't determine home directory")?;
    path.push(".gitconfig");
    let file = File::open(&path).with_context(|| format!("failed to open git config file at {path:?}"))?;
    let reader = BufReader::new(file);
    let mut name = String::new();
    let mut email = String::new();
    for line in reader.lines() {
        let line = line.context("failed to read git config file line")?;
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("name") {
            if let Some(value) = rest.trim_start().strip_prefix('=') {
                name = value.trim().to_string();
            }
        } else if let Some(rest) = line.strip_prefix("email") {
            if let Some(value) = rest.trim_start().strip_prefix('=') {
                email = value.trim().to_string();
            }
        }
        if !name.is_empty() && !email.is_empty() {
            break;
        }
    }
    let now = Local::now();
    let tz_offset_minutes = now.offset().local_minus_utc() / 60;
    Ok(Signature::new(name, email, now.timestamp(), tz_offset_minutes))
}
