//! Statistics output shared by commands.

use console::style;
use worldmap::cache::CacheStats;
use worldmap::session::MapSession;

/// Print cache, worker pool and render counters.
pub fn print_session_stats(session: &MapSession, json: bool) {
    if json {
        let value = serde_json::json!({
            "caches": session.caches().stats(),
            "workers": session.context().materializer().stats(),
            "render": session.context().metrics().snapshot(),
        });
        match serde_json::to_string_pretty(&value) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("{} {}", style("error:").red().bold(), e),
        }
        return;
    }

    println!("{}", style("Caches").bold().underlined());
    print_cache_table(&session.caches().stats());
    println!();

    let pool = session.context().materializer().stats();
    println!("{}", style("Workers").bold().underlined());
    println!(
        "  spawned {}  completed {}  skipped {}  discarded {}  panicked {}",
        pool.spawned, pool.completed, pool.skipped, pool.discarded, pool.panicked
    );
    println!();

    let metrics = session.context().metrics().snapshot();
    println!("{}", style("Render").bold().underlined());
    println!(
        "  steps created {}  evicted {}  region fetches {}  resident binds {}",
        metrics.steps_created, metrics.steps_evicted, metrics.region_fetches, metrics.resident_binds
    );
    println!(
        "  scaled builds {}  dirty marks {}  placeholders {}  backend errors {}",
        metrics.scaled_builds, metrics.dirty_marks, metrics.placeholders, metrics.backend_errors
    );
}

/// Print one row per cache.
pub fn print_cache_table(stats: &[CacheStats]) {
    println!(
        "  {:<18} {:>8} {:>8} {:>8} {:>8} {:>10} {:>8}",
        "name", "entries", "hits", "misses", "loads", "avg load", "hit rate"
    );
    for s in stats {
        println!(
            "  {:<18} {:>8} {:>8} {:>8} {:>8} {:>8.2}ms {:>7.1}%",
            style(&s.name).cyan(),
            s.entry_count,
            s.hits,
            s.misses,
            s.loads,
            s.avg_load_time_ms,
            s.hit_rate() * 100.0
        );
        if s.load_exceptions > 0 {
            println!(
                "  {:<18} {} load failures",
                "",
                style(s.load_exceptions).red()
            );
        }
    }
}
