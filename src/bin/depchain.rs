extern crate dependency_chain;

use anyhow::Context;
use clap::{ArgGroup, CommandFactory, Parser};
use dependency_chain::apiset;
use dependency_chain::common::{decanonicalize, path_to_string, LookupError};
use dependency_chain::graph::DependencyGraph;
use dependency_chain::logger::init_logger;
use dependency_chain::lookup_path::LookupPath;
use dependency_chain::pe::{PEFile, PEFileMap, PEImportReader};
use dependency_chain::query::LookupQuery;
use dependency_chain::render::{
    print, ApisetReport, DependencyChain, ExportsReport, ImportsReport, KnownDllsReport,
    ManifestReport, ModuleList, Printable, Printer, SxsReport,
};
use dependency_chain::strategy::{FoundFilter, IgnoredStrategies, SearchStrategy};
use dependency_chain::sxs::SxsEntries;
use dependency_chain::system::WindowsSystem;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(
    name = "depchain",
    version,
    about = "Dump the dependencies of a Windows binary, as the loader would resolve them"
)]
#[command(group(ArgGroup::new("command").multiple(false)))]
struct Args {
    /// Output format
    #[arg(long, value_enum, default_value_t = Printer::Pretty)]
    printer: Printer,

    /// Limit recursion depth when analysing modules or the dependency chain (0: unlimited)
    #[arg(short, long, default_value_t = 0)]
    depth: usize,

    /// For the clean printer, print found (true) or not found (false) libraries
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set, value_name = "BOOL")]
    found_or_not: bool,

    /// ;-separated additional folders to search for libraries
    #[arg(long, value_name = "FOLDERS")]
    custom_folders: Option<String>,

    /// ;-separated search strategies to skip
    #[arg(long, value_name = "STRATEGIES", long_help = ignore_help())]
    ignore: Option<String>,

    /// Root of the Windows partition to use
    /// (default: detected from the system or the file location)
    #[arg(short, long, value_name = "WINDOWS_ROOT")]
    windows_root: Option<PathBuf>,

    /// Working directory to be considered in the lookup path (default: the file's directory)
    #[arg(short = 'k', long, value_name = "WORKDIR")]
    workdir: Option<PathBuf>,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only report errors
    #[arg(short, long)]
    quiet: bool,

    /// Dump all the system's known dlls (x86 and x64)
    #[arg(long, group = "command")]
    knowndll: bool,

    /// Dump the system's ApiSet schema (api set dll -> host dll)
    #[arg(long, group = "command")]
    apisets: bool,

    /// Dump the ApiSet schema from apisetschema <FILE> (api set dll -> host dll)
    #[arg(long, group = "command")]
    apisetsdll: bool,

    /// Dump <FILE> embedded manifest, if it exists
    #[arg(long, group = "command")]
    manifest: bool,

    /// Dump all of <FILE>'s sxs dependencies
    #[arg(long, group = "command")]
    sxsentries: bool,

    /// Dump <FILE> imports
    #[arg(long, group = "command")]
    imports: bool,

    /// Dump <FILE> exports
    #[arg(long, group = "command")]
    exports: bool,

    /// Dump <FILE> whole dependency chain
    #[arg(long, group = "command")]
    chain: bool,

    /// Dump <FILE> resolved modules
    #[arg(long, group = "command")]
    modules: bool,

    /// Target file (.exe or .dll)
    file: Option<PathBuf>,
}

fn ignore_help() -> String {
    let names: Vec<&str> = SearchStrategy::ALL.iter().map(|s| s.as_str()).collect();
    format!(
        "Ignore the given search strategies when analysing modules or the dependency chain, \
         types: {}",
        names.join(", ")
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    KnownDll,
    ApiSets,
    ApiSetsDll,
    Manifest,
    SxsEntries,
    Imports,
    Exports,
    Chain,
    Modules,
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Self::KnownDll => "knowndll",
            Self::ApiSets => "apisets",
            Self::ApiSetsDll => "apisetsdll",
            Self::Manifest => "manifest",
            Self::SxsEntries => "sxsentries",
            Self::Imports => "imports",
            Self::Exports => "exports",
            Self::Chain => "chain",
            Self::Modules => "modules",
        }
    }
}

impl Args {
    fn selected_command(&self) -> Option<Command> {
        [
            (self.knowndll, Command::KnownDll),
            (self.apisets, Command::ApiSets),
            (self.apisetsdll, Command::ApiSetsDll),
            (self.manifest, Command::Manifest),
            (self.sxsentries, Command::SxsEntries),
            (self.imports, Command::Imports),
            (self.exports, Command::Exports),
            (self.chain, Command::Chain),
            (self.modules, Command::Modules),
        ]
        .into_iter()
        .find(|(selected, _)| *selected)
        .map(|(_, command)| command)
    }
}

fn print_usage() -> anyhow::Result<()> {
    Args::command().print_help()?;
    Ok(())
}

/// The Windows installation to report on when no target file is involved
fn system_for(args: &Args) -> anyhow::Result<WindowsSystem> {
    if let Some(root) = &args.windows_root {
        return WindowsSystem::from_root(root).with_context(|| {
            format!("No Windows installation found at {}", path_to_string(root))
        });
    }
    #[cfg(windows)]
    {
        Ok(WindowsSystem::current()?)
    }
    #[cfg(not(windows))]
    {
        anyhow::bail!("Not running on Windows: specify a Windows partition with --windows-root")
    }
}

/// Lookup configuration for `file`, with the command line overrides applied
fn build_query(args: &Args, file: &Path) -> anyhow::Result<LookupQuery> {
    let mut query = LookupQuery::deduce_from_executable_location(file)
        .with_context(|| format!("Could not set up the lookup for {}", path_to_string(file)))?;

    query.parameters.max_depth = args.depth;
    query.parameters.found_filter = FoundFilter::from_found_or_not(args.found_or_not);
    if let Some(ignore) = &args.ignore {
        query.parameters.ignored_strategies = IgnoredStrategies::parse_list(ignore)?;
    }
    if let Some(folders) = &args.custom_folders {
        query.add_custom_folders(
            folders
                .split(';')
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
        );
    }

    // overrides (must be last)
    if let Some(root) = &args.windows_root {
        query.set_windows_root(root)?;
    } else if let Some(system) = &query.system {
        tracing::info!(
            "Windows partition root not specified, assumed {}",
            decanonicalize(&path_to_string(&system.win_dir))
        );
    } else {
        tracing::warn!(
            "Windows partition root not specified, and the file doesn't lie in one; \
             system DLL imports will not be resolved"
        );
    }
    if let Some(workdir) = &args.workdir {
        query.target.working_dir = workdir.clone();
    } else {
        tracing::info!(
            "Working directory not specified, assuming directory of executable: {}",
            decanonicalize(&path_to_string(&query.target.working_dir))
        );
    }
    Ok(query)
}

fn dump_graph(
    args: &Args,
    command: Command,
    file: &Path,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    if args.printer == Printer::Json {
        eprintln!("Json output is not currently supported when dumping the dependency chain.");
        return Ok(());
    }

    let query = build_query(args, file)?;
    let filemap = PEFileMap::new(&query.target.target_exe)?;
    let pefile = PEFile::new(&filemap)?;
    let win_dir = query.system.as_ref().map(|s| s.win_dir.as_path());
    let sxs = SxsEntries::from_pe(&pefile, &query.target.app_dir, win_dir).unwrap_or_else(|e| {
        tracing::warn!("Ignoring side-by-side declarations: {}", e);
        SxsEntries::default()
    });
    let lookup_path = LookupPath::new(&query, sxs, pefile.is_x86());
    tracing::debug!(
        "Search path: {}",
        lookup_path
            .search_path()
            .iter()
            .map(|p| decanonicalize(&path_to_string(p)))
            .collect::<Vec<_>>()
            .join(", ")
    );

    let mut graph = DependencyGraph::build(
        PEImportReader,
        lookup_path,
        &query.target.target_exe,
        query.parameters.clone(),
    )?;

    let report: Box<dyn Printable> = match command {
        Command::Chain => Box::new(DependencyChain::from_graph(&mut graph)),
        _ => Box::new(ModuleList::from_graph(&graph)),
    };
    match args.printer {
        Printer::Clean => report.clean_print(out)?,
        _ => report.pretty_print(out)?,
    }
    Ok(())
}

fn dump_file(
    args: &Args,
    command: Command,
    file: &Path,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let filemap = PEFileMap::new(file)?;
    let pefile = PEFile::new(&filemap)
        .with_context(|| format!("Could not load file {} as a PE", path_to_string(file)))?;
    let path = file.to_owned();

    match command {
        Command::ApiSetsDll => {
            let schema = match pefile.section_bytes(".apiset") {
                Some(section) => apiset::parse_apiset_section(section)?,
                None => anyhow::bail!("{} has no .apiset section", path_to_string(file)),
            };
            print(args.printer, &ApisetReport { schema }, out)?;
        }
        Command::Manifest => {
            let report = ManifestReport::new(path, pefile.read_manifest()?);
            print(args.printer, &report, out)?;
        }
        Command::SxsEntries => {
            let query = build_query(args, file)?;
            let win_dir = query.system.as_ref().map(|s| s.win_dir.as_path());
            let sxs = SxsEntries::from_pe(&pefile, &query.target.app_dir, win_dir)?;
            print(args.printer, &SxsReport { file: path, sxs }, out)?;
        }
        Command::Imports => {
            let imports = pefile.read_imports()?;
            print(args.printer, &ImportsReport { file: path, imports }, out)?;
        }
        Command::Exports => {
            let exports = pefile.read_exports()?;
            print(args.printer, &ExportsReport { file: path, exports }, out)?;
        }
        Command::KnownDll | Command::ApiSets | Command::Chain | Command::Modules => {
            anyhow::bail!("Command {} is not a single file dump", command.name())
        }
    }
    Ok(())
}

fn run(args: &Args) -> anyhow::Result<()> {
    let Some(command) = args.selected_command() else {
        return print_usage();
    };

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match command {
        Command::KnownDll => {
            let system = system_for(args)?;
            if system.known_dlls.is_none() {
                tracing::warn!("KnownDlls can only be listed on a running Windows system");
            }
            print(args.printer, &KnownDllsReport::from_system(&system), &mut out)?;
        }
        Command::ApiSets => {
            let system = system_for(args)?;
            let schema = system
                .apiset_map
                .context("The ApiSet schema of the system could not be read")?;
            print(args.printer, &ApisetReport { schema }, &mut out)?;
        }
        _ => {
            let Some(file) = &args.file else {
                eprintln!(
                    "[x] Command {} needs to have a PE <FILE> argument\n",
                    command.name()
                );
                return print_usage();
            };
            if !file.exists() {
                anyhow::bail!("Could not find file {} on disk", path_to_string(file));
            }
            tracing::debug!("Loading file {}", path_to_string(file));
            match command {
                Command::Chain | Command::Modules => dump_graph(args, command, file, &mut out)?,
                _ => dump_file(args, command, file, &mut out)?,
            }
        }
    }
    out.flush()?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logger(args.verbose > 0, args.quiet);

    let result = run(&args);
    if let Err(e) = &result {
        if let Some(LookupError::Resolution(resolution)) = e.downcast_ref::<LookupError>() {
            eprintln!("[x] {}: {}", resolution, resolution.cause());
            for file in resolution.trace() {
                eprintln!("\twhile processing {}", decanonicalize(&path_to_string(file)));
            }
        }
    }
    result
}
