//! The impls and functions.
//!
use std::{fs, io::{stdout, Write}, path::{Path, PathBuf}, sync::OnceLock, time::Instant};
use log::*;
use colored::*;
use anyhow::{Context, Result};
use regex::Regex;
use substring::Substring;
use crate::utility;
use crate::dumpheap::{HeapDump, HeapInfo};

/// The method table, count and total size columns are in the first 39 characters, the class name follows.
const NUMBERS_WIDTH: usize = 39;
const MINIMAL_LINE_LENGTH: usize = 40;

fn whitespace() -> &'static Regex
{
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();
    WHITESPACE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

impl HeapInfo {
    /// Parse a single `dumpheap -stat` line.
    ///
    /// Anything that isn't a heap line (headers, totals, other debugger output) returns `None`:
    /// - lines of 40 characters or less.
    /// - lines that don't have exactly three columns in the first 39 characters.
    /// - lines where count or total size are not integers.
    pub fn parse(
        line: &str,
    ) -> Option<HeapInfo>
    {
        // 00007ff80d35b350        1           24 System.Threading.Tasks.SynchronizationContextAwaitTaskContinuation+<>c
        // The length excludes the line terminator, see "Line length for heap lines" in DESIGN.md.
        if line.chars().count() <= MINIMAL_LINE_LENGTH
        {
            return None;
        }
        let numbers: Vec<&str> = whitespace().split(line.substring(0, NUMBERS_WIDTH).trim()).collect();
        if numbers.len() != 3
        {
            return None;
        }
        let count = numbers[1].parse::<i64>().ok()?;
        let total_size = numbers[2].parse::<i64>().ok()?;

        Some(HeapInfo {
            count,
            total_size,
            mt: numbers[0].to_string(),
            class_name: line.substring(NUMBERS_WIDTH, line.len()).trim().to_string(),
        })
    }
}

impl HeapDump {
    pub fn new() -> Self { Default::default() }
    /// Parse `dumpheap -stat` output.
    /// If a method table shows up more than once, the last line wins.
    pub fn parse_dumpheap(
        log: &str,
    ) -> HeapDump
    {
        let mut heapdump = HeapDump::new();
        let mut skipped = 0;
        for line in log.lines()
        {
            match HeapInfo::parse(line)
            {
                Some(heapinfo) => {
                    heapdump.heapinfo.insert(heapinfo.mt.clone(), heapinfo);
                },
                None => skipped += 1,
            }
        }
        debug!("heap lines: {}, skipped lines: {}", heapdump.heapinfo.len(), skipped);
        heapdump
    }
    /// Read a `dumpheap -stat` log file.
    /// Invalid UTF-8 in the log is replaced, not rejected.
    pub fn read_file(
        path: &Path,
    ) -> Result<HeapDump>
    {
        info!("begin parse: {}", path.display());
        let timer = Instant::now();

        let data = fs::read(path)
            .with_context(|| format!("Error reading file: {}", path.display()))?;
        let heapdump = HeapDump::parse_dumpheap(&String::from_utf8_lossy(&data));

        info!("end parse: {:?}", timer.elapsed());
        Ok(heapdump)
    }
    /// Subtract the counts and sizes of the baseline from this dump.
    ///
    /// Only method tables that exist in both are changed.
    /// Method tables only in the baseline are ignored, method tables only in this dump are left alone.
    pub fn subtract(
        &mut self,
        baseline: &HeapDump,
    )
    {
        for (mt, base) in &baseline.heapinfo
        {
            if let Some(heapinfo) = self.heapinfo.get_mut(mt)
            {
                heapinfo.count = heapinfo.count.saturating_sub(base.count);
                heapinfo.total_size = heapinfo.total_size.saturating_sub(base.total_size);
            }
        }
    }
    /// The entries with a positive count, highest count first.
    /// Entries with an equal count keep the order of the dump.
    pub fn growth(
        &self,
    ) -> Vec<&HeapInfo>
    {
        let mut growth: Vec<&HeapInfo> = self.heapinfo.values()
            .filter(|heapinfo| heapinfo.count > 0)
            .collect();
        growth.sort_by(|a, b| b.count.cmp(&a.count));
        growth
    }
    /// Write the growth as CSV: a header line and a line per entry, the class name quoted.
    /// The header is written even if there is no growth.
    pub fn write_csv<W: Write>(
        &self,
        writer: W,
    ) -> Result<()>
    {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .quote_style(csv::QuoteStyle::Never)
            .from_writer(writer);
        writer.write_record(["count", "total_size", "mt", "class_name"])
            .with_context(|| "Unable to write CSV header")?;
        for row in self.growth()
        {
            writer.serialize(row)
                .with_context(|| format!("Unable to serialize: {} {} {} {}", row.count, row.total_size, row.mt, row.class_name))?;
        }
        writer.flush()
            .with_context(|| "Error flushing buffer")?;
        Ok(())
    }
    /// Write the growth as CSV to `path`. The file gets truncated and overwritten.
    pub fn save_csv(
        &self,
        path: &Path,
    ) -> Result<()>
    {
        info!("save_csv: {}", path.display());
        let file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .with_context(|| format!("Cannot create file: {}", path.display()))?;
        self.write_csv(file)
            .with_context(|| format!("Error writing file: {}", path.display()))?;
        Ok(())
    }
    /// The `top` entries with the highest count.
    pub fn top(
        &self,
        top: usize,
    ) -> Vec<&HeapInfo>
    {
        self.growth().into_iter().take(top).collect()
    }
    /// Write the `top` entries with the highest count as a table.
    /// Nothing is written if `top` is 0.
    pub fn write_top<W: Write>(
        &self,
        mut writer: W,
        title: &str,
        top: usize,
    ) -> Result<()>
    {
        if top == 0
        {
            return Ok(());
        }
        writeln!(writer, "--------------------------------------------------------------------------------------------------------------------------------------")?;
        writeln!(writer, "Growth: {}", title)?;
        writeln!(writer, "--------------------------------------------------------------------------------------------------------------------------------------")?;
        writeln!(writer, "{:>10} {:>14} {:18} {}", "count", "total_size", "mt", "class_name")?;
        for row in self.top(top)
        {
            writeln!(writer, "{:>10} {:>14} {:18} {}", row.count.to_string().red(), row.total_size, row.mt, row.class_name)?;
        }
        Ok(())
    }
    /// Print the `top` entries with the highest count to stdout.
    pub fn print(
        &self,
        title: &str,
        top: usize,
    ) -> Result<()>
    {
        self.write_top(stdout().lock(), title, top)
            .with_context(|| "Error printing growth")
    }
}

/// Read the baseline, before and after dumps, subtract the baseline from before and after,
/// and save both as CSV. Returns the paths of the before and after CSV files.
pub fn diff_dumpheaps(
    baseline: &Path,
    before: &Path,
    after: &Path,
    output_dir: &Option<PathBuf>,
    top: usize,
) -> Result<(PathBuf, PathBuf)>
{
    info!("begin diff");
    let timer = Instant::now();

    let baseline_dump = HeapDump::read_file(baseline)?;
    let mut before_dump = HeapDump::read_file(before)?;
    let mut after_dump = HeapDump::read_file(after)?;

    before_dump.subtract(&baseline_dump);
    after_dump.subtract(&baseline_dump);

    let before_csv = utility::output_path(before, output_dir, "csv")?;
    before_dump.save_csv(&before_csv)?;
    let after_csv = utility::output_path(after, output_dir, "csv")?;
    after_dump.save_csv(&after_csv)?;

    before_dump.print(&before.display().to_string(), top)?;
    after_dump.print(&after.display().to_string(), top)?;

    info!("end diff: {:?}", timer.elapsed());
    Ok((before_csv, after_csv))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heapinfo(mt: &str, count: i64, total_size: i64, class_name: &str) -> HeapInfo {
        HeapInfo { count, total_size, mt: mt.to_string(), class_name: class_name.to_string() }
    }

    fn heapdump(entries: Vec<HeapInfo>) -> HeapDump {
        let mut heapdump = HeapDump::new();
        for entry in entries {
            heapdump.heapinfo.insert(entry.mt.clone(), entry);
        }
        heapdump
    }

    #[test]
    fn unit_parse_heap_line() {
        let line = "00007ff80d35b350        1           24 System.Threading.Tasks.SynchronizationContextAwaitTaskContinuation+<>c";
        let result = HeapInfo::parse(line).unwrap();

        assert_eq!(result.mt, "00007ff80d35b350");
        assert_eq!(result.count, 1);
        assert_eq!(result.total_size, 24);
        assert_eq!(result.class_name, "System.Threading.Tasks.SynchronizationContextAwaitTaskContinuation+<>c");
    }

    #[test]
    fn unit_parse_heap_line_large_numbers() {
        let line = "00007ff80c4a1d30   123456     98765432 System.String";
        let result = HeapInfo::parse(line).unwrap();

        assert_eq!(result.count, 123456);
        assert_eq!(result.total_size, 98765432);
        assert_eq!(result.class_name, "System.String");
    }

    #[test]
    fn unit_parse_heap_line_too_short() {
        // exactly 40 characters.
        let line = "00007ff80d35b350        1           24 X";
        assert_eq!(line.chars().count(), 40);
        assert_eq!(HeapInfo::parse(line), None);
        assert_eq!(HeapInfo::parse(""), None);
    }

    #[test]
    fn unit_parse_heap_line_non_numeric() {
        let line = "00007ff80d35b350        x           24 System.Object";
        assert_eq!(HeapInfo::parse(line), None);
        let line = "00007ff80d35b350        1         24kb System.Object";
        assert_eq!(HeapInfo::parse(line), None);
    }

    #[test]
    fn unit_parse_heap_line_header() {
        let line = "              MT    Count    TotalSize Class Name";
        assert_eq!(HeapInfo::parse(line), None);
    }

    #[test]
    fn unit_parse_heap_line_wrong_number_of_columns() {
        let line = "Statistics:                              and some more text here";
        assert_eq!(HeapInfo::parse(line), None);
        let line = "00007ff80d35b350  1  2  24               System.Object";
        assert_eq!(HeapInfo::parse(line), None);
    }

    #[test]
    fn unit_parse_dumpheap_last_line_wins() {
        let log = r#"Statistics:
              MT    Count    TotalSize Class Name
00007ff80d35b350        1           24 System.Object
00007ff80c4a1d30       10          480 System.String
00007ff80d35b350        7          168 System.Object
Total 18 objects, 672 bytes
"#;
        let result = HeapDump::parse_dumpheap(log);

        assert_eq!(result.heapinfo.len(), 2);
        assert_eq!(result.heapinfo["00007ff80d35b350"].count, 7);
        assert_eq!(result.heapinfo["00007ff80d35b350"].total_size, 168);
        assert_eq!(result.heapinfo["00007ff80c4a1d30"].count, 10);
    }

    #[test]
    fn unit_subtract_baseline() {
        let baseline = heapdump(vec![heapinfo("A", 5, 50, "Alpha"), heapinfo("C", 2, 20, "Gamma")]);
        let mut target = heapdump(vec![heapinfo("A", 8, 80, "Alpha"), heapinfo("B", 3, 30, "Beta")]);

        target.subtract(&baseline);

        assert_eq!(target.heapinfo.len(), 2);
        assert_eq!(target.heapinfo["A"].count, 3);
        assert_eq!(target.heapinfo["A"].total_size, 30);
        assert_eq!(target.heapinfo["B"].count, 3);
        assert_eq!(target.heapinfo["B"].total_size, 30);
        assert!(!target.heapinfo.contains_key("C"));
        // the baseline is not changed.
        assert_eq!(baseline.heapinfo["A"].count, 5);
    }

    #[test]
    fn unit_subtract_below_zero() {
        let baseline = heapdump(vec![heapinfo("A", 5, 50, "Alpha")]);
        let mut target = heapdump(vec![heapinfo("A", 2, 20, "Alpha")]);

        target.subtract(&baseline);

        assert_eq!(target.heapinfo["A"].count, -3);
        assert_eq!(target.heapinfo["A"].total_size, -30);
    }

    #[test]
    fn unit_subtract_saturates() {
        let baseline = heapdump(vec![heapinfo("A", i64::MAX, i64::MAX, "Alpha")]);
        let mut target = heapdump(vec![heapinfo("A", i64::MIN, -10, "Alpha")]);

        target.subtract(&baseline);

        assert_eq!(target.heapinfo["A"].count, i64::MIN);
        assert_eq!(target.heapinfo["A"].total_size, i64::MIN);
    }

    #[test]
    fn unit_top_limits_rows() {
        let dump = heapdump(vec![
            heapinfo("A", 3, 30, "Alpha"),
            heapinfo("B", 0, 0, "Beta"),
            heapinfo("C", 12, 120, "Gamma"),
            heapinfo("E", 7, 70, "Epsilon"),
        ]);
        let mts = |top: usize| -> Vec<String> { dump.top(top).into_iter().map(|row| row.mt.clone()).collect() };

        assert!(mts(0).is_empty());
        assert_eq!(mts(2), vec!["C", "E"]);
        // more than there is growth: all entries with a positive count.
        assert_eq!(mts(10), vec!["C", "E", "A"]);
    }

    #[test]
    fn unit_write_top_zero_writes_nothing() {
        let dump = heapdump(vec![heapinfo("A", 3, 30, "Alpha")]);
        let mut output: Vec<u8> = Vec::new();
        dump.write_top(&mut output, "after.txt", 0).unwrap();

        assert!(output.is_empty());
    }

    #[test]
    fn unit_write_top_table() {
        let dump = heapdump(vec![
            heapinfo("00007ff80c4a1d30", 3, 144, "System.String"),
            heapinfo("00007ff80d35b350", 12, 288, "System.Object"),
            heapinfo("00007ff80c4c0a10", 7, 336, "Walkabout.Data.Account"),
        ]);
        let mut output: Vec<u8> = Vec::new();
        dump.write_top(&mut output, "after.txt", 2).unwrap();
        let table = String::from_utf8(output).unwrap();
        let lines: Vec<&str> = table.lines().collect();

        // three title lines, the heading and two rows.
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[1], "Growth: after.txt");
        assert!(lines[4].ends_with("            288 00007ff80d35b350   System.Object"));
        assert!(lines[5].ends_with("            336 00007ff80c4c0a10   Walkabout.Data.Account"));
        assert!(!table.contains("System.String"));
    }

    #[test]
    fn unit_growth_filters_and_sorts() {
        let dump = heapdump(vec![
            heapinfo("A", 3, 30, "Alpha"),
            heapinfo("B", 0, 0, "Beta"),
            heapinfo("C", 12, 120, "Gamma"),
            heapinfo("D", -4, -40, "Delta"),
            heapinfo("E", 3, 90, "Epsilon"),
        ]);
        let growth: Vec<&str> = dump.growth().into_iter().map(|row| row.mt.as_str()).collect();

        assert_eq!(growth, vec!["C", "A", "E"]);
    }

    #[test]
    fn unit_write_csv() {
        let dump = heapdump(vec![
            heapinfo("00007ff80d35b350", 2, 48, "System.Object"),
            heapinfo("00007ff80c4a1d30", 0, 0, "System.String"),
            heapinfo("00007ff80c4b2e40", 5, 200, "System.Collections.Generic.List`1[[System.Object, System.Private.CoreLib]]"),
        ]);
        let mut output: Vec<u8> = Vec::new();
        dump.write_csv(&mut output).unwrap();

        assert_eq!(String::from_utf8(output).unwrap(), r#"count,total_size,mt,class_name
5,200,00007ff80c4b2e40,"System.Collections.Generic.List`1[[System.Object, System.Private.CoreLib]]"
2,48,00007ff80d35b350,"System.Object"
"#);
    }

    #[test]
    fn unit_write_csv_doubles_quotes() {
        let dump = heapdump(vec![heapinfo("A", 1, 8, "Weird\"Name")]);
        let mut output: Vec<u8> = Vec::new();
        dump.write_csv(&mut output).unwrap();

        assert_eq!(String::from_utf8(output).unwrap(), "count,total_size,mt,class_name\n1,8,A,\"Weird\"\"Name\"\n");
    }

    #[test]
    fn unit_write_csv_no_growth_writes_header() {
        let dump = heapdump(vec![heapinfo("A", 0, 0, "Alpha")]);
        let mut output: Vec<u8> = Vec::new();
        dump.write_csv(&mut output).unwrap();

        assert_eq!(String::from_utf8(output).unwrap(), "count,total_size,mt,class_name\n");
    }
}
