//! `boxfs`: a thin command-line front end over the `boxfs` library, for
//! manual exploration and smoke-testing of container files. Not part of the
//! library's public contract (§2, §6).

use std::io::{self, Read, Write};
use std::process::exit;

use anyhow::{anyhow, bail, Context, Result};
use boxfs::{FileSystem, FileType, OpenOptions};

/// Parsed command line: the sub-command name plus its own argument list.
struct Args {
	prog: String,
	command: String,
	rest: Vec<String>,
}

fn parse_args() -> Args {
	let mut iter = std::env::args();
	let prog = iter.next().unwrap_or_else(|| "boxfs".to_owned());
	let command = iter.next().unwrap_or_default();
	let rest: Vec<String> = iter.collect();
	Args { prog, command, rest }
}

fn main() {
	env_logger::init();
	let args = parse_args();

	let result = match args.command.as_str() {
		"create" => cmd_create(&args.rest),
		"ls" => cmd_ls(&args.rest),
		"cat" => cmd_cat(&args.rest),
		"write" => cmd_write(&args.rest),
		"rm" => cmd_rm(&args.rest),
		"mv" => cmd_mv(&args.rest),
		"cp" => cmd_cp(&args.rest),
		"stat" => cmd_stat(&args.rest),
		"df" => cmd_df(&args.rest),
		"" | "-h" | "--help" => {
			print_usage(&args.prog);
			exit(0);
		}
		other => Err(anyhow!("unknown sub-command `{other}`")),
	};

	if let Err(e) = result {
		eprintln!("{}: error: {e}", args.prog);
		exit(1);
	}
}

fn print_usage(prog: &str) {
	println!(
		"usage: {prog} <command> <container> [args...]\n\n\
		 commands:\n  \
		 create <container> [--block-size N] [--total-blocks N]\n  \
		 ls <container> <path>\n  \
		 cat <container> <path>\n  \
		 write <container> <path>   (reads content from stdin)\n  \
		 rm <container> <path>\n  \
		 mv <container> <src> <dst> [--replace]\n  \
		 cp <container> <src> <dst> [--replace]\n  \
		 stat <container> <path>\n  \
		 df <container>"
	);
}

/// Opens `container` read-write, failing with a friendly error if missing.
fn open_existing(container: &str) -> Result<FileSystem> {
	FileSystem::open(container, &OpenOptions::new())
		.with_context(|| format!("opening container {container:?}"))
}

fn take_flag(args: &mut Vec<String>, flag: &str) -> bool {
	if let Some(pos) = args.iter().position(|a| a == flag) {
		args.remove(pos);
		true
	} else {
		false
	}
}

fn take_value_flag(args: &mut Vec<String>, flag: &str) -> Result<Option<String>> {
	if let Some(pos) = args.iter().position(|a| a == flag) {
		if pos + 1 >= args.len() {
			bail!("{flag} requires a value");
		}
		args.remove(pos);
		Ok(Some(args.remove(pos)))
	} else {
		Ok(None)
	}
}

fn cmd_create(rest: &[String]) -> Result<()> {
	let mut rest = rest.to_vec();
	let block_size = take_value_flag(&mut rest, "--block-size")?
		.map(|s| s.parse::<u32>())
		.transpose()
		.context("--block-size must be an integer")?;
	let total_blocks = take_value_flag(&mut rest, "--total-blocks")?
		.map(|s| s.parse::<u64>())
		.transpose()
		.context("--total-blocks must be an integer")?;
	let container = rest.first().ok_or_else(|| anyhow!("missing <container>"))?;

	let mut opts = OpenOptions::new().create(true);
	if let Some(bs) = block_size {
		opts = opts.block_size(bs);
	}
	if let Some(tb) = total_blocks {
		opts = opts.total_blocks(tb);
	}
	let fs = FileSystem::open(container, &opts).with_context(|| format!("creating container {container:?}"))?;
	fs.close()?;
	println!("created {container}");
	Ok(())
}

fn cmd_ls(rest: &[String]) -> Result<()> {
	let container = rest.first().ok_or_else(|| anyhow!("missing <container>"))?;
	let path = rest.get(1).map(String::as_str).unwrap_or("/");
	let fs = open_existing(container)?;
	for name in fs.list_directory(path)? {
		let child_path = if path == "/" {
			format!("/{name}")
		} else {
			format!("{path}/{name}")
		};
		let meta = fs.stat(&child_path)?;
		let marker = match meta.file_type {
			FileType::Directory => "/",
			FileType::File => "",
		};
		println!("{name}{marker}\t{}", meta.size);
	}
	Ok(())
}

fn cmd_cat(rest: &[String]) -> Result<()> {
	let container = rest.first().ok_or_else(|| anyhow!("missing <container>"))?;
	let path = rest.get(1).ok_or_else(|| anyhow!("missing <path>"))?;
	let fs = open_existing(container)?;
	let data = fs.read_file(path)?;
	io::stdout().write_all(&data)?;
	Ok(())
}

fn cmd_write(rest: &[String]) -> Result<()> {
	let container = rest.first().ok_or_else(|| anyhow!("missing <container>"))?;
	let path = rest.get(1).ok_or_else(|| anyhow!("missing <path>"))?;
	let fs = open_existing(container)?;
	let mut data = Vec::new();
	io::stdin().read_to_end(&mut data)?;
	fs.write_file(path, &data)?;
	fs.close()?;
	println!("wrote {} bytes to {path}", data.len());
	Ok(())
}

fn cmd_rm(rest: &[String]) -> Result<()> {
	let container = rest.first().ok_or_else(|| anyhow!("missing <container>"))?;
	let path = rest.get(1).ok_or_else(|| anyhow!("missing <path>"))?;
	let fs = open_existing(container)?;
	fs.delete(path)?;
	fs.close()?;
	println!("removed {path}");
	Ok(())
}

fn cmd_mv(rest: &[String]) -> Result<()> {
	let mut rest = rest.to_vec();
	let replace = take_flag(&mut rest, "--replace");
	let container = rest.first().cloned().ok_or_else(|| anyhow!("missing <container>"))?;
	let from = rest.get(1).cloned().ok_or_else(|| anyhow!("missing <src>"))?;
	let to = rest.get(2).cloned().ok_or_else(|| anyhow!("missing <dst>"))?;
	let fs = open_existing(&container)?;
	fs.mv(&from, &to, replace)?;
	fs.close()?;
	println!("moved {from} to {to}");
	Ok(())
}

fn cmd_cp(rest: &[String]) -> Result<()> {
	let mut rest = rest.to_vec();
	let replace = take_flag(&mut rest, "--replace");
	let container = rest.first().cloned().ok_or_else(|| anyhow!("missing <container>"))?;
	let from = rest.get(1).cloned().ok_or_else(|| anyhow!("missing <src>"))?;
	let to = rest.get(2).cloned().ok_or_else(|| anyhow!("missing <dst>"))?;
	let fs = open_existing(&container)?;
	fs.cp(&from, &to, replace)?;
	fs.close()?;
	println!("copied {from} to {to}");
	Ok(())
}

fn cmd_stat(rest: &[String]) -> Result<()> {
	let container = rest.first().ok_or_else(|| anyhow!("missing <container>"))?;
	let path = rest.get(1).ok_or_else(|| anyhow!("missing <path>"))?;
	let fs = open_existing(container)?;
	let meta = fs.stat(path)?;
	let kind = match meta.file_type {
		FileType::File => "file",
		FileType::Directory => "directory",
	};
	let ts = meta.timestamps;
	println!("path:     {path}");
	println!("type:     {kind}");
	println!("size:     {}", meta.size);
	println!("created:  {} ms since epoch", ts.created);
	println!("modified: {} ms since epoch", ts.modified);
	println!("accessed: {} ms since epoch", ts.accessed);
	Ok(())
}

fn cmd_df(rest: &[String]) -> Result<()> {
	let container = rest.first().ok_or_else(|| anyhow!("missing <container>"))?;
	let fs = open_existing(container)?;
	let free = fs.free_blocks()?;
	let total = fs.total_blocks();
	let block_size = fs.block_size();
	println!("block size:  {block_size}");
	println!("total blocks: {total}");
	println!("free blocks:  {free}");
	println!(
		"used:         {:.1}%",
		100.0 * (total.saturating_sub(free)) as f64 / total.max(1) as f64
	);
	Ok(())
}
