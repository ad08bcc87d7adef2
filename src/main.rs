// HBNB Store - operator CLI
//
// Usage:
//   hbnb stats
//   hbnb all <Type>
//   hbnb show <Type> <id>
//   hbnb destroy <Type> <id>
//   hbnb search [--states ids] [--cities ids] [--amenities ids] [--compat]
//
// Backend selection comes from HBNB_CONFIG / HBNB_* environment variables.

use anyhow::{bail, Context, Result};
use hbnb_store::{logging, search, Config, EntityKind, Registry, SearchMode, SearchRequest, VERSION};
use std::env;

fn main() -> Result<()> {
    logging::init_tracing();

    let args: Vec<String> = env::args().skip(1).collect();
    let Some(command) = args.first() else {
        print_usage();
        return Ok(());
    };

    let config = Config::load().context("loading configuration")?;
    let registry = Registry::initialize(&config).context("opening storage")?;

    let outcome = run(&registry, &config, command, &args[1..]);
    registry.shutdown()?;
    outcome
}

fn run(registry: &Registry, config: &Config, command: &str, rest: &[String]) -> Result<()> {
    match command {
        "stats" => run_stats(registry),
        "all" => {
            let kind = parse_kind(rest.first())?;
            run_all(registry, kind)
        }
        "show" => {
            let (kind, id) = kind_and_id(rest)?;
            run_show(registry, kind, id)
        }
        "destroy" => {
            let (kind, id) = kind_and_id(rest)?;
            run_destroy(registry, kind, id)
        }
        "search" => run_search(registry, config, rest),
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => bail!("unknown command: {}", other),
    }
}

fn print_usage() {
    println!("hbnb {}", VERSION);
    println!("  stats                        count entities per type");
    println!("  all <Type>                   list every entity of a type");
    println!("  show <Type> <id>             print one entity");
    println!("  destroy <Type> <id>          delete an entity and its dependents");
    println!("  search [--states a,b] [--cities a,b] [--amenities a,b] [--compat]");
}

fn parse_kind(name: Option<&String>) -> Result<EntityKind> {
    let name = name.context("missing type name")?;
    Ok(name.parse::<EntityKind>()?)
}

fn kind_and_id(rest: &[String]) -> Result<(EntityKind, &str)> {
    let kind = parse_kind(rest.first())?;
    let id = rest.get(1).context("missing id")?;
    Ok((kind, id.as_str()))
}

fn run_stats(registry: &Registry) -> Result<()> {
    println!("📊 Entity counts");
    println!("━━━━━━━━━━━━━━━━━━━━");
    for (collection, count) in registry.stats()? {
        println!("{:<12} {}", collection, count);
    }
    println!("{:<12} {}", "links", registry.backend().link_count()?);
    Ok(())
}

fn run_all(registry: &Registry, kind: EntityKind) -> Result<()> {
    for record in registry.all_records(kind)? {
        println!("{}", serde_json::to_string(&record.to_mapping()?)?);
    }
    Ok(())
}

fn run_show(registry: &Registry, kind: EntityKind, id: &str) -> Result<()> {
    match registry.get_record(kind, id)? {
        Some(record) => {
            println!("{}", serde_json::to_string_pretty(&record.to_mapping()?)?);
            Ok(())
        }
        None => bail!("{} not found: {}", kind, id),
    }
}

fn run_destroy(registry: &Registry, kind: EntityKind, id: &str) -> Result<()> {
    let report = registry.delete_by_id(kind, id)?;
    println!("✓ Deleted {} {}", kind, id);
    for (removed_kind, count) in &report.removed {
        println!("  {:<8} {}", removed_kind.as_str(), count);
    }
    if report.links_removed > 0 {
        println!("  {:<8} {}", "links", report.links_removed);
    }
    Ok(())
}

fn run_search(registry: &Registry, config: &Config, rest: &[String]) -> Result<()> {
    let mut request = SearchRequest::default();
    let mut mode = config.search_mode();

    let mut args = rest.iter();
    while let Some(flag) = args.next() {
        let target = match flag.as_str() {
            "--states" => &mut request.states,
            "--cities" => &mut request.cities,
            "--amenities" => &mut request.amenities,
            "--compat" => {
                mode = SearchMode::Compatibility;
                continue;
            }
            other => bail!("unknown search flag: {}", other),
        };
        let value = args.next().with_context(|| format!("{} needs a value", flag))?;
        target.extend(split_ids(value));
    }

    let places = search::search(registry, &request, mode)?;
    println!("🔍 {} place(s) found ({:?})", places.len(), mode);
    for place in places {
        println!("  {}  {}", place.base.id, place.name);
    }
    Ok(())
}

/// Comma-separated id list, blanks dropped
fn split_ids(raw: &str) -> impl Iterator<Item = String> + '_ {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}
