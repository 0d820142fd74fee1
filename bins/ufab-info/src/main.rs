//! Print the fabric components, memory domains and transport resources
//! available in this process.

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use ufab_md::{
    md_config_read, register_stub, rkey_release, rkey_unpack, ComponentRegistry, MdAttr,
    MemFlags, MemoryDomain, RkeyIntegrity, TlResourceDesc,
};

#[derive(Parser, Debug)]
#[command(name = "ufab-info", about = "Show available fabric components and resources")]
struct Args {
    /// Emit machine-readable JSON instead of text.
    #[arg(long)]
    json: bool,

    /// Environment prefix for configuration lookups.
    #[arg(long, default_value = "UFAB_")]
    env_prefix: String,

    /// Pack remote keys with the component-name integrity prefix.
    #[arg(long)]
    rkey_check: bool,

    /// Run a pack/unpack round trip on each opened memory domain.
    #[arg(long)]
    self_check: bool,
}

#[derive(Serialize)]
struct MdReport {
    md_name: String,
    flags: String,
    max_alloc: usize,
    max_reg: usize,
    rkey_packed_size: usize,
    mem_type: ufab_md::MemoryType,
    tl_resources: Vec<TlResourceDesc>,
}

#[derive(Serialize)]
struct ComponentReport {
    name: String,
    transports: Vec<String>,
    mds: Vec<MdReport>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let integrity = if args.rkey_check {
        RkeyIntegrity::NamePrefix
    } else {
        RkeyIntegrity::Disabled
    };

    let registry = ComponentRegistry::new();
    register_stub(&registry).context("failed to register the stub component")?;

    let mut reports = Vec::new();
    for registered in registry.components() {
        let component = registered.component();
        let transports: Vec<String> = registered
            .transports()
            .iter()
            .map(|tl| tl.name().to_string())
            .collect();

        let config = md_config_read(component.as_ref(), &args.env_prefix)
            .with_context(|| format!("failed to read config for component '{}'", registered.name()))?;

        let mut mds = Vec::new();
        for resource in component.query_md_resources().unwrap_or_default() {
            let mut md = match MemoryDomain::open(&registered, &resource.md_name, &config, integrity)
            {
                Ok(md) => md,
                Err(status) => {
                    tracing::warn!(md = %resource.md_name, %status, "failed to open memory domain");
                    continue;
                }
            };
            let attr = md
                .query()
                .with_context(|| format!("failed to query md '{}'", resource.md_name))?;

            if args.self_check {
                rkey_round_trip(&mut md, &attr, integrity)
                    .with_context(|| format!("rkey self-check failed on md '{}'", resource.md_name))?;
            }

            let list = md.query_tl_resources();
            for skip in &list.skipped {
                tracing::warn!(tl = %skip.tl_name, status = %skip.status, "transport skipped during discovery");
            }
            mds.push(MdReport {
                md_name: resource.md_name,
                flags: format!("{:?}", attr.flags),
                max_alloc: attr.max_alloc,
                max_reg: attr.max_reg,
                rkey_packed_size: attr.rkey_packed_size,
                mem_type: attr.mem_type,
                tl_resources: list.resources,
            });
        }

        reports.push(ComponentReport {
            name: registered.name().to_string(),
            transports,
            mds,
        });
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        print_text(&reports);
    }
    Ok(())
}

/// Register a small buffer, pack its key and unpack it back through the
/// owning component.
fn rkey_round_trip(md: &mut MemoryDomain, attr: &MdAttr, integrity: RkeyIntegrity) -> Result<()> {
    let mut buf = vec![0u8; 4096];
    let memh = md.mem_reg(buf.as_mut_ptr(), buf.len(), MemFlags::ACCESS_RMA)?;

    let mut packed = vec![0u8; attr.rkey_packed_size];
    md.mkey_pack(&memh, &mut packed)?;

    let component = md.component().component().clone();
    let bundle = rkey_unpack(component.as_ref(), &packed, integrity)?;
    rkey_release(component.as_ref(), bundle)?;

    md.mem_dereg(memh)?;
    Ok(())
}

fn print_text(reports: &[ComponentReport]) {
    for report in reports {
        println!("component '{}'", report.name);
        if report.transports.is_empty() {
            println!("  transports: (none)");
        } else {
            println!("  transports: {}", report.transports.join(", "));
        }
        for md in &report.mds {
            println!("  md '{}'", md.md_name);
            println!("    flags:            {}", md.flags);
            println!("    max alloc:        {}", md.max_alloc);
            println!("    max reg:          {}", md.max_reg);
            println!("    rkey packed size: {}", md.rkey_packed_size);
            for tl in &md.tl_resources {
                println!(
                    "    resource: {}/{} ({:?})",
                    tl.tl_name, tl.dev_name, tl.dev_type
                );
            }
        }
    }
}
