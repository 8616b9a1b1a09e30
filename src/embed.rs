//! Host-embedding handshake over stdio.
//!
//! With `--embed <id>` the process announces itself with a single JSON line
//! on stdout and blocks until the host answers with the initial script text,
//! before the first render. Lines that are not the awaited `embed-init` are
//! ignored with a log.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};

const PROTOCOL_NAME: &str = "rhai-playground";

#[derive(Debug, Serialize)]
struct EmbedLoaded<'a> {
    from: &'static str,
    req: &'static str,
    id: &'a str,
}

#[derive(Debug, Deserialize)]
struct Inbound {
    #[serde(default)]
    to: Option<String>,
    req: String,
    #[serde(default)]
    code: Option<String>,
}

/// Classify one inbound line. `Ok(Some(code))` for a well-formed
/// `embed-init` addressed to us, `Ok(None)` for anything that is simply not
/// ours, `Err` for an `embed-init` with a missing code.
fn parse_embed_init(line: &str) -> Result<Option<String>> {
    let msg: Inbound = match serde_json::from_str(line) {
        Ok(msg) => msg,
        Err(_) => return Ok(None),
    };
    if msg.req != "embed-init" {
        return Ok(None);
    }
    if msg.to.as_deref().is_some_and(|to| to != PROTOCOL_NAME) {
        return Ok(None);
    }
    msg.code
        .map(Some)
        .context("embed-init carried no code string")
}

/// Run the handshake: post `embed-loaded{id}` outward, then wait for
/// `embed-init{code}` on stdin. Returns the initial script text.
pub fn negotiate(id: &str) -> Result<String> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer(
        &mut out,
        &EmbedLoaded {
            from: PROTOCOL_NAME,
            req: "embed-loaded",
            id,
        },
    )?;
    out.write_all(b"\n")?;
    out.flush()?;

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("reading embed-init from stdin")?;
        if line.trim().is_empty() {
            continue;
        }
        match parse_embed_init(&line)? {
            Some(code) => return Ok(code),
            None => tracing::debug!("ignoring unrecognized embed message"),
        }
    }
    anyhow::bail!("stdin closed before embed-init arrived")
}
