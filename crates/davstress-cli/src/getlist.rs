//! The `getlist` mode: fetch every URL in a list and keep one shared
//! aggregate, rather than walking a filesystem lifecycle. Grounded on
//! `urltest_getlist.c`'s `main` -- a flat loop over lines with a single
//! `aggr_stats` accumulator, unlike the per-entity stats in the webdav
//! driver.

use std::io::{BufRead, Write};

use davstress_core::Stats;
use davstress_transport::{HostMapping, WebdavCredentials, WebdavTransport, WebdavTransportConfig};

use crate::config::GetlistArgs;
use crate::formatter;

pub async fn run(args: GetlistArgs) -> Result<i32, anyhow::Error> {
    let urls = read_list(&args.list)?;

    let mut host_mappings = Vec::with_capacity(args.host_mappings.len());
    for raw in &args.host_mappings {
        host_mappings.push(HostMapping::parse(raw)?);
    }

    let credentials = match (&args.username, &args.password) {
        (Some(u), Some(p)) => Some(WebdavCredentials {
            username: u.clone(),
            password: p.clone(),
        }),
        (None, None) => None,
        _ => anyhow::bail!("--username and --password must be given together"),
    };

    let transport = WebdavTransport::new(WebdavTransportConfig {
        credentials,
        verify_peer: !args.insecure,
        host_mappings,
        follow_redirects: args.follow,
        verbose: args.transport_verbose,
        timeout: std::time::Duration::from_secs(60),
    })?;

    let mut aggr_stats = Stats::new();

    for raw in &urls {
        let Some(target_url) = compose_target(args.base_url.as_deref(), raw) else {
            continue;
        };

        if args.dry_run {
            println!("<- {target_url}");
            continue;
        }

        let url = url::Url::parse(&target_url)?;
        let mut retry_count = 0u32;
        loop {
            let outcome = transport.download(&url, None).await?;
            if outcome.status != 0 {
                aggr_stats.update(&outcome.timings, outcome.status);
                if args.verbose {
                    let trailer = match &outcome.info {
                        Some(info) => format!("\"{info}\""),
                        None => String::new(),
                    };
                    println!(
                        "T,{},\"{target_url}\",{},{},{},{},{},{},{},{trailer}",
                        outcome.status,
                        outcome.timings.dns,
                        outcome.timings.tcp_connect,
                        outcome.timings.tls_handshake,
                        outcome.timings.pre_transfer,
                        outcome.timings.first_response_byte,
                        outcome.timings.total_time,
                        outcome.timings.content_bytes,
                    );
                }
                break;
            }
            if retry_count < args.retries {
                retry_count += 1;
                continue;
            }
            if args.verbose {
                let buf = transport.error_buffer();
                println!("F,0,\"{target_url}\",0,0,0,0,0,0,0,\"{buf}\"");
            }
            break;
        }
    }

    if !args.dry_run {
        if let Some(sink) = &args.stats {
            let mut file;
            let mut stdout_lock;
            let out: &mut dyn Write = match &sink.path {
                Some(path) => {
                    file = std::fs::File::create(path)?;
                    &mut file
                }
                None => {
                    stdout_lock = std::io::stdout().lock();
                    &mut stdout_lock
                }
            };
            formatter::write_stats(out, sink.format, false, "getlist", &aggr_stats)?;
        }
    }

    Ok(0)
}

/// Reads `-`  as stdin, otherwise a file, one URL per line.
fn read_list(list: &str) -> Result<Vec<String>, anyhow::Error> {
    let lines: Vec<String> = if list == "-" {
        std::io::stdin().lock().lines().collect::<std::io::Result<_>>()?
    } else {
        let contents = std::fs::read_to_string(list)?;
        contents.lines().map(str::to_string).collect()
    };
    Ok(lines)
}

/// Joins `base_url` and a list entry the way the original does: a trailing
/// slash on the base absorbs any leading slashes on the entry, otherwise one
/// slash is inserted between them. Blank lines are skipped.
fn compose_target(base_url: Option<&str>, raw: &str) -> Option<String> {
    let trimmed = raw.trim_end();
    match base_url {
        Some(base) => {
            if trimmed.is_empty() && base.is_empty() {
                return None;
            }
            if base.ends_with('/') {
                Some(format!("{base}{}", trimmed.trim_start_matches('/')))
            } else if trimmed.is_empty() || trimmed.starts_with('/') {
                Some(format!("{base}{trimmed}"))
            } else {
                Some(format!("{base}/{trimmed}"))
            }
        }
        None => {
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_with_terminal_slash_strips_leading_slashes() {
        assert_eq!(
            compose_target(Some("https://h/a/"), "/b/c"),
            Some("https://h/a/b/c".to_string())
        );
    }

    #[test]
    fn base_url_without_terminal_slash_inserts_one() {
        assert_eq!(
            compose_target(Some("https://h/a"), "b/c"),
            Some("https://h/a/b/c".to_string())
        );
    }

    #[test]
    fn base_url_without_terminal_slash_keeps_existing_leading_slash() {
        assert_eq!(
            compose_target(Some("https://h/a"), "/b/c"),
            Some("https://h/a/b/c".to_string())
        );
    }

    #[test]
    fn no_base_url_passes_entry_through() {
        assert_eq!(
            compose_target(None, "https://h/x"),
            Some("https://h/x".to_string())
        );
    }

    #[test]
    fn blank_line_is_skipped() {
        assert_eq!(compose_target(None, "   "), None);
    }
}
