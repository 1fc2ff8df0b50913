// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! `tether resolve`: offline stack trace resolution.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use tether_symbolicate::SourceMapResolver;

#[derive(Args, Debug)]
pub struct ResolveArgs {
	/// Source map file for the script
	#[arg(long)]
	pub map: PathBuf,

	/// URL the script was served from, as it appears in stack frames
	#[arg(long)]
	pub script_url: String,

	/// File containing the stack trace; read from stdin when omitted
	pub stack: Option<PathBuf>,
}

pub fn run(args: &ResolveArgs) -> anyhow::Result<()> {
	let stack = match &args.stack {
		Some(path) => read_file(path)?,
		None => {
			let mut buf = String::new();
			std::io::stdin()
				.read_to_string(&mut buf)
				.context("reading stack trace from stdin")?;
			buf
		}
	};

	let map_json = read_file(&args.map)?;
	let resolved = resolve_stack(&args.script_url, &map_json, &stack)?;
	if resolved.resolved == 0 {
		tracing::warn!(script_url = %args.script_url, "no frames matched the source map");
	}
	println!("{}", resolved.text);
	Ok(())
}

fn read_file(path: &Path) -> anyhow::Result<String> {
	std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn resolve_stack(
	script_url: &str,
	map_json: &str,
	stack: &str,
) -> anyhow::Result<tether_symbolicate::ResolvedStack> {
	let mut resolver = SourceMapResolver::default();
	resolver
		.insert_map(script_url, map_json)
		.context("parsing source map")?;
	Ok(resolver.resolve_stack(stack.trim_end()))
}
