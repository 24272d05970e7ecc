//! ndnopp-ctl — command-line interface for the ndn-opp daemon.

mod cmd;

use anyhow::{Context, Result};

const DEFAULT_PORT: u16 = 9101;

fn print_usage() {
    println!("Usage: ndnopp-ctl [--port <port>] <command>");
    println!();
    println!("Commands:");
    println!("  status                          Show daemon status");
    println!("  peers                           List discovered peers");
    println!("  faces                           List opportunistic faces");
    println!("  transfers                       List active transfers");
    println!("  flush                           Dispatch queued transfers to reachable peers");
    println!("  engine faces                    Show the engine face table");
    println!("  engine <table>                  Dump an engine table (fib, pit, cs, sct, name_tree)");
    println!("  route add <prefix> <face> [cost]");
    println!("  route remove <prefix> <face>");
    println!("  shutdown                        Stop the daemon");
    println!();
    println!("Options:");
    println!("  --port <port>   Status endpoint port (default: {})", DEFAULT_PORT);
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    // Parse --port option
    let mut port = DEFAULT_PORT;
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--port" {
            i += 1;
            port = args
                .get(i)
                .context("--port requires a value")?
                .parse()
                .context("--port must be a number")?;
        } else {
            remaining.push(&args[i]);
        }
        i += 1;
    }

    match remaining.as_slice() {
        ["status"] | [] => cmd::status::cmd_status(port).await,
        ["peers"] => cmd::status::cmd_peers(port).await,
        ["faces"] => cmd::status::cmd_faces(port).await,
        ["transfers"] => cmd::status::cmd_transfers(port).await,
        ["flush"] => cmd::status::cmd_flush(port).await,
        ["shutdown"] => cmd::status::cmd_shutdown(port).await,
        ["engine", "faces"] => cmd::engine::cmd_face_table(port).await,
        ["engine", table] => cmd::engine::cmd_table(port, table).await,
        ["route", "add", prefix, face] => cmd::engine::cmd_route_add(port, prefix, face, None).await,
        ["route", "add", prefix, face, cost] => {
            cmd::engine::cmd_route_add(port, prefix, face, Some(*cost)).await
        }
        ["route", "remove", prefix, face] => cmd::engine::cmd_route_remove(port, prefix, face).await,
        ["help"] | ["--help"] | ["-h"] => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
