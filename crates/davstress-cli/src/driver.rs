//! The driver loop (C5): pulls one entity at a time from the selector,
//! invokes the transport operation implied by its current state, updates
//! its stats handle, and advances it. Grounded on the `while (e = ...)`
//! loop in `urltest_webdav.c`'s `main`.

use std::io::Write;
use std::path::PathBuf;

use davstress_core::{
    advance_entity, compose_url, resolve, resolve_mut, select_depth_first, select_random_walk,
    EnableMask, Entity, Forest, Method, Timings,
};
use davstress_transport::{HostMapping, WebdavCredentials, WebdavTransport, WebdavTransportConfig};

use crate::config::{StatsSink, TreeListing, WebdavArgs};
use crate::{formatter, walk};

struct Target {
    path: PathBuf,
    base_url: String,
}

struct StepOutcome {
    ok: bool,
    status: u16,
    timings: Timings,
    propfind_supported: Option<bool>,
    delete_supported: Option<bool>,
}

pub async fn run(args: WebdavArgs) -> Result<i32, anyhow::Error> {
    let targets = resolve_targets(&args)?;

    let enable_mask = EnableMask {
        options: !args.no_options,
        getinfo: true,
        download_range: args.download_range,
        delete: !args.no_delete,
    };

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
        follow_redirects: !args.no_follow,
        verbose: args.transport_verbose,
        timeout: std::time::Duration::from_secs(60),
    })?;

    let listing = args.listing();
    let stats_sink = args.stats.clone();
    let mut rng = rand::rng();

    for target in targets {
        let (root, base_path) = walk::build(&target.path, enable_mask)?;
        if listing != TreeListing::None {
            print_listing(&root, listing, args.ascii);
        }
        let mut forest = Forest::new(root, base_path, enable_mask);

        if args.verbose {
            println!(
                "\nCommencing up to {} generation{} against {}...",
                args.max_generations,
                if args.max_generations == 1 { "" } else { "s" },
                target.base_url
            );
        }

        loop {
            let selection = if args.depth_first {
                select_depth_first(&mut forest, args.max_generations)
            } else {
                select_random_walk(&mut forest, args.max_generations, &mut rng)
            };
            let Some(path) = selection else { break };

            let entity = resolve(&forest, &path);
            let kind = entity.kind;
            let state = entity.state;
            let Some(method) = state.method(kind) else {
                // A *_sub state returned directly: the selector already
                // advanced it past an empty phase, nothing to transmit.
                advance_entity(resolve_mut(&mut forest, &path));
                continue;
            };
            let url = compose_url(&target.base_url, &forest.base_path, resolve(&forest, &path));

            if args.dry_run {
                if args.verbose {
                    println!("(dry-run) {} {}", method.label(), url);
                }
                advance_entity(resolve_mut(&mut forest, &path));
                continue;
            }

            let outcome = match execute_step(&transport, &forest, &path, method, &url).await {
                Ok(o) => o,
                Err(err) => {
                    eprintln!("REQUEST ERROR(-) for '{url}' : {err}");
                    let buf = transport.error_buffer();
                    if !buf.is_empty() {
                        eprintln!("{buf}");
                    }
                    return Ok(os_exit_code(&err));
                }
            };

            let mutable_entity = resolve_mut(&mut forest, &path);
            mutable_entity
                .stats_mut(method.stats_key())
                .update(&outcome.timings, outcome.status);

            let benign_mkcol = outcome.status == 405 && method == Method::Mkcol;
            if !outcome.ok && !benign_mkcol {
                match classify(outcome.status) {
                    Classification::Retry => continue,
                    Classification::Fatal(code) => {
                        let kind = if outcome.status >= 500 { "SERVER" } else { "REQUEST" };
                        eprintln!(
                            "{kind} ERROR({}) for '{url}' : {}",
                            outcome.status,
                            explanation(outcome.status)
                        );
                        let buf = transport.error_buffer();
                        if !buf.is_empty() {
                            eprintln!("{buf}");
                        }
                        return Ok(code);
                    }
                }
            }

            if let (Some(has_propfind), Some(has_delete)) =
                (outcome.propfind_supported, outcome.delete_supported)
            {
                apply_options_mask(&mut forest, &path, has_propfind, has_delete);
            }

            if args.verbose {
                println!("{:<3} {} {}", outcome.status, method.label(), url);
            }
            advance_entity(resolve_mut(&mut forest, &path));
        }

        if let Some(sink) = &stats_sink {
            emit_stats(&forest, sink, &target.base_url)?;
        }
    }

    Ok(0)
}

async fn execute_step(
    transport: &WebdavTransport,
    forest: &Forest,
    path: &[usize],
    method: Method,
    url: &str,
) -> Result<StepOutcome, anyhow::Error> {
    let url = url::Url::parse(url)?;
    let entity = resolve(forest, path);
    match method {
        Method::Mkcol => {
            let o = transport.mkdir(&url).await;
            Ok(plain(o.ok, o.status, o.timings))
        }
        Method::Put => {
            let o = transport.upload(&entity.path, &url).await?;
            Ok(plain(o.ok, o.status, o.timings))
        }
        Method::Options => {
            let o = transport.options(&url).await;
            Ok(StepOutcome {
                ok: o.outcome.ok,
                status: o.outcome.status,
                timings: o.outcome.timings,
                propfind_supported: Some(o.has_propfind),
                delete_supported: Some(o.has_delete),
            })
        }
        Method::Getinfo => {
            let o = transport.getinfo(&url).await;
            Ok(plain(o.ok, o.status, o.timings))
        }
        Method::DownloadRange => {
            use rand::RngExt;
            let size = entity.size;
            let start = rand::rng().random_range(0..=size);
            let end = rand::rng().random_range(start..=size);
            let o = transport.download_range(&url, None, start, end).await?;
            Ok(plain(o.ok, o.status, o.timings))
        }
        Method::Download => {
            let o = transport.download(&url, None).await?;
            Ok(plain(o.ok, o.status, o.timings))
        }
        Method::Delete => {
            let o = transport.delete(&url).await;
            Ok(plain(o.ok, o.status, o.timings))
        }
    }
}

fn plain(ok: bool, status: u16, timings: Timings) -> StepOutcome {
    StepOutcome {
        ok,
        status,
        timings,
        propfind_supported: None,
        delete_supported: None,
    }
}

fn apply_options_mask(forest: &mut Forest, path: &[usize], has_propfind: bool, has_delete: bool) {
    let is_root = path.is_empty();
    if !has_propfind {
        if is_root {
            forest.disable_getinfo_everywhere();
        } else {
            resolve_mut(forest, path).enable_mask.getinfo = false;
        }
    }
    if !has_delete {
        if is_root {
            forest.disable_delete_everywhere();
        } else {
            resolve_mut(forest, path).enable_mask.delete = false;
        }
    }
}

enum Classification {
    Retry,
    Fatal(i32),
}

/// Maps a failed HTTP status to an exit classification per §7. 2xx/3xx
/// never reach here; the transport already reports those as `ok`.
fn classify(status: u16) -> Classification {
    match status {
        408 => Classification::Retry,
        400 => Classification::Fatal(libc::EINVAL),
        401 | 403 => Classification::Fatal(libc::EACCES),
        507 => Classification::Fatal(libc::ENOSPC),
        506 | 508 => Classification::Fatal(libc::ELOOP),
        _ => Classification::Fatal(libc::EPERM),
    }
}

/// Per-status stderr text, shared with `http_error_exit()` in the original
/// `urltest_getlist.c`/`urltest_webdav.c` sources.
fn explanation(status: u16) -> &'static str {
    match status {
        400 => "request was not properly constructed",
        401 => "authentication was required and credentials did not work",
        403 => "access forbidden by server, unable to proceed further",
        507 => "no room left on device",
        506 | 508 => "referential loop detected",
        _ => "unable to proceed further",
    }
}

/// `errno` pass-through for OS-level transport failures (disk full writing
/// a download sink, permission denied reading an upload source, ...).
fn os_exit_code(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<std::io::Error>())
        .and_then(std::io::Error::raw_os_error)
        .unwrap_or(libc::EPERM)
}

fn resolve_targets(args: &WebdavArgs) -> Result<Vec<Target>, anyhow::Error> {
    if let Some(base_url) = &args.base_url {
        if args.paths_and_urls.is_empty() {
            anyhow::bail!("at least one local path is required");
        }
        Ok(args
            .paths_and_urls
            .iter()
            .map(|p| Target {
                path: PathBuf::from(p),
                base_url: base_url.clone(),
            })
            .collect())
    } else {
        if args.paths_and_urls.is_empty() || args.paths_and_urls.len() % 2 != 0 {
            anyhow::bail!(
                "without --base-url, each local path must be followed by its own destination URL"
            );
        }
        Ok(args
            .paths_and_urls
            .chunks_exact(2)
            .map(|pair| Target {
                path: PathBuf::from(&pair[0]),
                base_url: pair[1].clone(),
            })
            .collect())
    }
}

fn print_listing(root: &Entity, style: TreeListing, ascii: bool) {
    let (branch, leaf) = if ascii { ("|-- ", "`-- ") } else { ("├── ", "└── ") };

    fn walk_print(entity: &Entity, prefix: &str, branch: &str, leaf: &str, long: bool) {
        let label = if long {
            format!("{} ({:?}, gen {})", entity.name, entity.state, entity.generation)
        } else {
            entity.name.clone()
        };
        println!("{prefix}{label}");
        for (i, child) in entity.children.iter().enumerate() {
            let is_last = i + 1 == entity.children.len();
            let connector = if is_last { leaf } else { branch };
            walk_print(child, &format!("{prefix}{connector}"), branch, leaf, long);
        }
    }
    walk_print(root, "", branch, leaf, style == TreeListing::Long);
}

/// Per-entity stats dump, mirroring `fs_entity_list_stats_fprint`'s
/// recursive-print-per-node behaviour: every entity with at least one
/// recorded method prints its own snapshot blocks.
fn emit_stats(forest: &Forest, sink: &StatsSink, base_url: &str) -> Result<(), anyhow::Error> {
    let mut file;
    let mut stdout_lock;
    let out: &mut dyn Write = match &sink.path {
        Some(path) => {
            file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
            &mut file
        }
        None => {
            stdout_lock = std::io::stdout().lock();
            &mut stdout_lock
        }
    };

    writeln!(out, "\n==== {base_url} ====")?;
    forest.root.walk(&mut |entity| {
        for method in davstress_core::StatsMethod::ALL {
            if let Some(stats) = entity.stats_by_method.get(&method) {
                if stats.is_empty() {
                    continue;
                }
                let label = format!("{} {}", entity.path.display(), method.label());
                let _ = formatter::write_stats(out, sink.format, false, &label, stats);
            }
        }
    });
    Ok(())
}
