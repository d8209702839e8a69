//! The impls and functions.
//!
use std::{fs, io::{BufWriter, Write}, path::{Path, PathBuf}, time::Instant};
use log::*;
use anyhow::{Context, Result};
use htmlize::escape_attribute;
use crate::utility;
use crate::gcroots::{Graph, Link, Node};

const DGML_NAMESPACE: &str = "http://schemas.microsoft.com/vs/2009/dgml";
/// `gcroot` prints 64-bit addresses as 16 hexadecimal digits.
const ADDRESS_LENGTH: usize = 16;

impl Graph {
    pub fn new() -> Self { Default::default() }
    /// Return the node with `id`, creating it with `label` and `category` if it does not exist yet.
    /// An existing node is returned as is: the label and category of the first insert stay.
    pub fn get_or_create_node(
        &mut self,
        id: &str,
        label: &str,
        category: Option<&str>,
    ) -> &Node
    {
        self.nodes.entry(id.to_string()).or_insert_with(|| Node {
            id: id.to_string(),
            label: label.to_string(),
            category: category.map(str::to_string),
        })
    }
    /// Return the link from `source` to `target`, creating it if it does not exist yet.
    pub fn get_or_create_link(
        &mut self,
        source: &str,
        target: &str,
        label: Option<&str>,
        category: Option<&str>,
    ) -> &Link
    {
        self.links.entry(format!("{}->{}", source, target)).or_insert_with(|| Link {
            source: source.to_string(),
            target: target.to_string(),
            label: label.map(str::to_string),
            category: category.map(str::to_string),
        })
    }
    /// Write the graph as a DGML document.
    /// Nodes and links are written in the order they were first added.
    pub fn write_dgml<W: Write>(
        &self,
        writer: W,
    ) -> Result<()>
    {
        let mut writer = BufWriter::new(writer);

        writeln!(writer, "<DirectedGraph xmlns=\"{}\">", DGML_NAMESPACE)?;
        writeln!(writer, "<Nodes>")?;
        for node in self.nodes.values()
        {
            write!(writer, "  <Node Id=\"{}\" Label=\"{}\"", escape_attribute(&node.id), escape_attribute(&node.label))?;
            if let Some(category) = &node.category
            {
                write!(writer, " Category=\"{}\"", escape_attribute(category))?;
            }
            writeln!(writer, "/>")?;
        }
        writeln!(writer, "</Nodes>")?;
        writeln!(writer, "<Links>")?;
        for link in self.links.values()
        {
            write!(writer, "  <Link Source=\"{}\" Target=\"{}\"", escape_attribute(&link.source), escape_attribute(&link.target))?;
            if let Some(label) = &link.label
            {
                write!(writer, " Label=\"{}\"", escape_attribute(label))?;
            }
            if let Some(category) = &link.category
            {
                write!(writer, " Category=\"{}\"", escape_attribute(category))?;
            }
            writeln!(writer, "/>")?;
        }
        writeln!(writer, "</Links>")?;
        writeln!(writer, "</DirectedGraph>")?;

        writer.flush()
            .with_context(|| "Error flushing DGML buffer")?;
        Ok(())
    }
    /// Write the graph as DGML to `path`. The file gets truncated and overwritten.
    pub fn save_dgml(
        &self,
        path: &Path,
    ) -> Result<()>
    {
        info!("save_dgml: {}", path.display());
        let file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .with_context(|| format!("Cannot create file: {}", path.display()))?;
        self.write_dgml(file)
            .with_context(|| format!("Error writing file: {}", path.display()))?;
        Ok(())
    }
}

/// Turn a type name as printed by the debugger into something readable.
///
/// Generic types are printed as ``List`1[System.String]``, which becomes `List<System.String>`.
/// Trailing array suffixes (`[]`) are kept as they are.
/// Anything that doesn't look like a generic type is returned unchanged.
pub fn unmangle(
    name: &str,
) -> String
{
    let mut name = name;
    let mut arrays = String::new();
    while let Some(stripped) = name.strip_suffix("[]")
    {
        arrays.push_str("[]");
        name = stripped;
    }

    if let Some(backtick) = name.find('`')
    {
        if let Some(bracket) = name[backtick..].find('[')
        {
            let prefix = &name[..backtick];
            let tail = name[backtick + bracket..].replace('[', "<").replace(']', ">");
            return format!("{}{}{}", prefix, tail, arrays);
        }
    }
    format!("{}{}", name, arrays)
}

fn is_hex_address(
    address: &str,
) -> bool
{
    address.len() == ADDRESS_LENGTH && address.chars().all(|c| c.is_ascii_hexdigit())
}

/// Parse `gcroot` output into a graph.
///
/// Every accepted `->` line becomes a node, linked from the node of the previously accepted line.
/// Lines that do not have the `-> <16 hex digits> <type name>` shape are skipped,
/// and do not break the chain: the next accepted line links to the last accepted one.
pub fn parse_gcroot_log(
    log: &str,
) -> Graph
{
    let mut graph = Graph::new();
    let mut previous: Option<String> = None;
    let mut skipped = 0;

    for line in log.lines()
    {
        let line = line.trim();
        let chain_line = match line.strip_prefix("->")
        {
            Some(rest) => rest.trim(),
            None => continue,
        };
        // ->  000001DE8B4520D0 System.Windows.Threading.Dispatcher
        match chain_line.find(' ')
        {
            Some(position) if position == ADDRESS_LENGTH && is_hex_address(&chain_line[..position]) => {
                let address = &chain_line[..position];
                let label = unmangle(&chain_line[position + 1..]);
                let node_id = graph.get_or_create_node(address, &label, None).id.clone();
                if let Some(previous_id) = &previous
                {
                    graph.get_or_create_link(previous_id, &node_id, None, None);
                }
                previous = Some(node_id);
            },
            _ => {
                debug!("skipping chain line: {}", chain_line);
                skipped += 1;
            },
        }
    }
    debug!("nodes: {}, links: {}, skipped chain lines: {}", graph.nodes.len(), graph.links.len(), skipped);
    graph
}

/// Read a `gcroot` log file and parse it into a graph.
/// Invalid UTF-8 in the log is replaced, not rejected.
pub fn read_gcroot_file(
    path: &Path,
) -> Result<Graph>
{
    info!("begin parse: {}", path.display());
    let timer = Instant::now();

    let data = fs::read(path)
        .with_context(|| format!("Error reading file: {}", path.display()))?;
    let graph = parse_gcroot_log(&String::from_utf8_lossy(&data));

    info!("end parse: {:?}", timer.elapsed());
    Ok(graph)
}

/// Read the `gcroot` log at `path` and save it as DGML. Returns the path of the DGML file.
pub fn graph_gcroots(
    path: &Path,
    output_dir: &Option<PathBuf>,
) -> Result<PathBuf>
{
    let graph = read_gcroot_file(path)?;
    info!("nodes: {}, links: {}", graph.nodes.len(), graph.links.len());

    let dgml_file = utility::output_path(path, output_dir, "dgml")?;
    graph.save_dgml(&dgml_file)?;
    Ok(dgml_file)
}
