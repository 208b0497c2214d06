//! Human readable, scriptable and structured output of the analysis results

use crate::apiset::ApisetMap;
use crate::common::{path_to_string, LookupError};
use crate::graph::DependencyGraph;
use crate::lookup_path::ModuleResolver;
use crate::pe::{demangle_symbol, ExportEntry, ImportDll, ImportReader, ImportSymbol};
use crate::strategy::SearchStrategy;
use crate::sxs::SxsEntries;
use crate::system::WindowsSystem;
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Output formats selectable from the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Printer {
    #[default]
    Pretty,
    Clean,
    Json,
}

/// Something that can be shown to a user or piped to another tool
pub trait Printable {
    fn pretty_print(&self, out: &mut dyn Write) -> io::Result<()>;

    /// One item per line, without decorations
    fn clean_print(&self, out: &mut dyn Write) -> io::Result<()>;
}

/// Print `obj` in the requested format
pub fn print<T: Printable + Serialize>(
    printer: Printer,
    obj: &T,
    out: &mut dyn Write,
) -> Result<(), LookupError> {
    match printer {
        Printer::Pretty => obj.pretty_print(out)?,
        Printer::Clean => obj.clean_print(out)?,
        Printer::Json => {
            serde_json::to_writer_pretty(&mut *out, obj).map_err(io::Error::from)?;
            writeln!(out)?;
        }
    }
    Ok(())
}

fn display(p: &Path) -> String {
    crate::common::decanonicalize(&path_to_string(p))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KnownDllsReport {
    pub x64: Vec<PathBuf>,
    pub x86: Vec<PathBuf>,
}

impl KnownDllsReport {
    pub fn from_system(system: &WindowsSystem) -> Self {
        let paths = |list: Option<&crate::system::KnownDLLList>| {
            list.map(|kd| {
                kd.sorted_paths()
                    .into_iter()
                    .map(Path::to_owned)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default()
        };
        Self {
            x64: paths(system.known_dlls.as_ref()),
            x86: paths(system.known_dlls_x86.as_ref()),
        }
    }
}

impl Printable for KnownDllsReport {
    fn pretty_print(&self, out: &mut dyn Write) -> io::Result<()> {
        for (title, list) in [("64-bit", &self.x64), ("32-bit", &self.x86)] {
            writeln!(out, "[-] {} KnownDlls : ", title)?;
            for p in list {
                writeln!(out, "  {}", display(p))?;
            }
            writeln!(out)?;
        }
        Ok(())
    }

    fn clean_print(&self, out: &mut dyn Write) -> io::Result<()> {
        for p in self.x64.iter().chain(self.x86.iter()) {
            writeln!(out, "{}", display(p))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApisetReport {
    pub schema: ApisetMap,
}

impl Printable for ApisetReport {
    fn pretty_print(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "[-] Api Sets Map : ")?;
        for (name, hosts) in &self.schema {
            writeln!(out, "{} -> [ {} ]", name, hosts.join(","))?;
        }
        writeln!(out)
    }

    fn clean_print(&self, out: &mut dyn Write) -> io::Result<()> {
        for name in self.schema.keys() {
            writeln!(out, "{}", name)?;
        }
        Ok(())
    }
}

/// Manifest embedded in a PE file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestReport {
    pub file: PathBuf,
    pub manifest: Option<String>,
    #[serde(skip)]
    pub error: Option<String>,
}

impl ManifestReport {
    /// Wrap the raw manifest text, checking that it is well-formed XML
    pub fn new(file: PathBuf, manifest: Option<String>) -> Self {
        let error = manifest
            .as_deref()
            .and_then(|m| crate::sxs::parse_manifest(m).err())
            .map(|e| match e {
                LookupError::XmlError(xml) => xml.to_string(),
                other => other.to_string(),
            });
        Self {
            file,
            manifest,
            error,
        }
    }
}

impl Printable for ManifestReport {
    fn pretty_print(&self, out: &mut dyn Write) -> io::Result<()> {
        let file = display(&self.file);
        writeln!(out, "[-] Manifest for file : {}", file)?;
        match (&self.manifest, &self.error) {
            (None, _) => writeln!(out, "[x] No embedded pe manifest for file {}", file),
            (Some(_), Some(e)) => {
                writeln!(out, "[x] \"Malformed\" pe manifest for file {}", file)?;
                writeln!(out, "[x] Exception : {}", e)
            }
            (Some(m), None) => writeln!(out, "{}", m.trim_start_matches('\u{feff}')),
        }
    }

    fn clean_print(&self, out: &mut dyn Write) -> io::Result<()> {
        match (&self.manifest, &self.error) {
            (Some(m), None) => writeln!(out, "{}", m.trim_start_matches('\u{feff}')),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SxsReport {
    pub file: PathBuf,
    #[serde(flatten)]
    pub sxs: SxsEntries,
}

impl Printable for SxsReport {
    fn pretty_print(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(
            out,
            "[-] sxs dependencies for executable : {}",
            display(&self.file)
        )?;
        for entry in &self.sxs.entries {
            match &entry.path {
                Some(p) => writeln!(out, "  [+] {} : {}", entry.name, display(p))?,
                None => writeln!(out, "  [x] {} : {}", entry.name, entry.display_path())?,
            }
        }
        Ok(())
    }

    fn clean_print(&self, out: &mut dyn Write) -> io::Result<()> {
        for entry in &self.sxs.entries {
            writeln!(out, "{}", entry.display_path())?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportsReport {
    pub file: PathBuf,
    pub imports: Vec<ImportDll>,
}

impl Printable for ImportsReport {
    fn pretty_print(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "[-] Import listing for file : {}", display(&self.file))?;
        for dll in &self.imports {
            writeln!(out, "Import from module {} :", dll.name)?;
            for entry in &dll.entries {
                match &entry.symbol {
                    ImportSymbol::Ordinal(o) => write!(out, "\t Ordinal_{}", o)?,
                    ImportSymbol::Name(n) => write!(out, "\t Function {}", n)?,
                }
                if entry.delay_import {
                    write!(out, " (Delay Import)")?;
                }
                writeln!(out)?;
            }
        }
        writeln!(out, "[-] Import listing done")
    }

    fn clean_print(&self, out: &mut dyn Write) -> io::Result<()> {
        for dll in &self.imports {
            writeln!(out, "{}", dll.name)?;
            for entry in &dll.entries {
                match &entry.symbol {
                    ImportSymbol::Ordinal(o) => writeln!(out, "\t;{}", o)?,
                    ImportSymbol::Name(n) => writeln!(out, "\t;{}", n)?,
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportsReport {
    pub file: PathBuf,
    pub exports: Vec<ExportEntry>,
}

impl Printable for ExportsReport {
    fn pretty_print(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "[-] Export listing for file : {}", display(&self.file))?;
        for export in &self.exports {
            writeln!(out, "Export {} :", export.ordinal)?;
            if let Some(name) = &export.name {
                // fall back to the raw name for symbols that are not C++ decorated
                let demangled = demangle_symbol(name).unwrap_or_else(|_| name.clone());
                writeln!(out, "\t Name : {}", demangled)?;
            }
            writeln!(out, "\t VA : 0x{:X}", export.rva)?;
            if let Some(forwarded) = &export.forwarded_name {
                writeln!(out, "\t ForwardedName : {}", forwarded)?;
            }
        }
        writeln!(out, "[-] Export listing done")
    }

    fn clean_print(&self, out: &mut dyn Write) -> io::Result<()> {
        for export in &self.exports {
            write!(
                out,
                "{}\t;{}\t;{:X}",
                export.ordinal,
                export.name.as_deref().unwrap_or(""),
                export.rva
            )?;
            if let Some(forwarded) = &export.forwarded_name {
                write!(out, "\t;{}", forwarded)?;
            }
            writeln!(out)?;
        }
        Ok(())
    }
}

/// A module as shown by the graph printers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleLine {
    pub depth: usize,
    pub name: String,
    pub strategy: SearchStrategy,
    pub filepath: Option<PathBuf>,
}

impl ModuleLine {
    fn location(&self) -> String {
        self.filepath.as_deref().map(display).unwrap_or_default()
    }
}

/// Whole dependency tree of a binary, each module expanded at its first appearance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyChain {
    pub lines: Vec<ModuleLine>,
    pub clean: Vec<PathBuf>,
}

impl DependencyChain {
    pub fn from_graph<R, M>(graph: &mut DependencyGraph<R, M>) -> Self
    where
        R: ImportReader,
        M: ModuleResolver,
    {
        let lines = graph
            .tree_walk()
            .into_iter()
            .map(|e| {
                let node = graph.node(e.node);
                ModuleLine {
                    depth: e.depth,
                    name: node.name().to_owned(),
                    strategy: node.strategy(),
                    filepath: node.filepath().map(Path::to_owned),
                }
            })
            .collect();
        Self {
            lines,
            clean: graph.clean_chain(),
        }
    }
}

impl Printable for DependencyChain {
    fn pretty_print(&self, out: &mut dyn Write) -> io::Result<()> {
        for line in &self.lines {
            writeln!(
                out,
                "{}├ {} ({}) : {}",
                "|  ".repeat(line.depth),
                line.name,
                line.strategy,
                line.location()
            )?;
        }
        Ok(())
    }

    fn clean_print(&self, out: &mut dyn Write) -> io::Result<()> {
        for p in &self.clean {
            writeln!(out, "{}", display(p))?;
        }
        Ok(())
    }
}

/// Every module of a graph, sorted by search strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleList {
    pub modules: Vec<ModuleLine>,
    pub clean: Vec<PathBuf>,
}

impl ModuleList {
    pub fn from_graph<R: ImportReader, M: ModuleResolver>(graph: &DependencyGraph<R, M>) -> Self {
        let modules = graph
            .modules()
            .into_iter()
            .map(|id| {
                let node = graph.node(id);
                ModuleLine {
                    depth: node.level(),
                    name: node.name().to_owned(),
                    strategy: node.strategy(),
                    filepath: node.filepath().map(Path::to_owned),
                }
            })
            .collect();
        Self {
            modules,
            clean: graph.clean_modules(),
        }
    }
}

impl Printable for ModuleList {
    fn pretty_print(&self, out: &mut dyn Write) -> io::Result<()> {
        for m in &self.modules {
            writeln!(out, "[{}] {} : {}", m.strategy, m.name, m.location())?;
        }
        Ok(())
    }

    fn clean_print(&self, out: &mut dyn Write) -> io::Result<()> {
        for p in &self.clean {
            writeln!(out, "{}", display(p))?;
        }
        Ok(())
    }
}
