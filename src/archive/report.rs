//! Read-only reports over archives.
//!
//! Reports keep going past records that fail to parse and describe them in their output. Only
//! damaged record framing ends a scan early, since later records cannot be located.

use std::io::Write;

use crate::{
    archive::{Archive, McEntry, MclList, TableOfContents},
    Error, Result,
};

/// Outcome of [`integrity_check`].
#[derive(Debug, Default)]
pub struct IntegrityReport {
    /// Records examined
    pub checked: usize,
    /// One [`Error::Integrity`] per failed check
    pub failures: Vec<Error>,
}

impl IntegrityReport {
    /// True if every record passed
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }

    /// Numbers of the failing records, suitable for `copy` or `strip`.
    #[must_use]
    pub fn failed_list(&self) -> MclList {
        let mut numbers: Vec<u32> = self
            .failures
            .iter()
            .filter_map(|failure| match failure {
                Error::Integrity { number, .. } => Some(*number),
                _ => None,
            })
            .collect();
        numbers.dedup();
        MclList::from_numbers(numbers).unwrap_or_default()
    }

    fn fail(&mut self, number: u32, message: impl Into<String>) {
        let error = Error::Integrity {
            number,
            message: message.into(),
        };
        log::warn!("{}", error);
        self.failures.push(error);
    }
}

fn check_entry(entry: &McEntry<'_>, toc: Option<&TableOfContents>, report: &mut IntegrityReport) {
    match entry.context() {
        Ok(mc) => match mc.to_bytes() {
            Ok(bytes) if bytes == entry.data => {}
            Ok(_) => report.fail(entry.number, "does not re-serialize identically"),
            Err(error) => report.fail(entry.number, format!("cannot be re-serialized: {error}")),
        },
        Err(error) => report.fail(entry.number, format!("does not parse: {error}")),
    }

    let Some(toc) = toc else {
        return;
    };
    match toc.find(entry.number) {
        None => report.fail(entry.number, "missing from the table of contents"),
        Some(indexed) => {
            if indexed.offset != entry.offset || indexed.length as usize != entry.data.len() {
                report.fail(
                    entry.number,
                    format!(
                        "indexed at {}+{} but found at {}+{}",
                        indexed.offset,
                        indexed.length,
                        entry.offset,
                        entry.data.len()
                    ),
                );
            } else if indexed.hash != entry.hash() {
                report.fail(entry.number, "hash differs from the table of contents");
            }
        }
    }
}

/// Verifies that every record parses and re-serializes to the same bytes, and, with a `toc`,
/// that the index agrees with the archive.
///
/// # Errors
/// [`Error::StaleToc`] if `toc` was built for a different archive. Per-record problems are
/// reported in the result instead.
pub fn integrity_check(archive: &Archive, toc: Option<&TableOfContents>) -> Result<IntegrityReport> {
    if let Some(toc) = toc {
        toc.validate(archive)?;
    }

    let mut report = IntegrityReport::default();
    let mut last = 0;
    for entry in archive {
        match entry {
            Ok(entry) => {
                report.checked += 1;
                last = entry.number;
                check_entry(&entry, toc, &mut report);
            }
            Err(error) => {
                report.fail(last + 1, format!("damaged framing: {error}"));
                break;
            }
        }
    }

    if let Some(toc) = toc {
        if toc.len() > report.checked {
            report.fail(
                last + 1,
                format!(
                    "table of contents lists {} records, archive holds {}",
                    toc.len(),
                    report.checked
                ),
            );
        }
    }

    log::info!(
        "Checked {} method contexts, {} problems",
        report.checked,
        report.failures.len()
    );
    Ok(report)
}

/// Writes one CSV row per record: number, offset, size, packet count, IL size, thin flag, hash.
///
/// Records that fail to parse get empty columns after their size. Damaged framing ends the
/// table with a `#` comment line naming its offset.
///
/// # Errors
/// Failures writing to `out`.
pub fn stat<W: Write>(archive: &Archive, out: &mut W) -> Result<usize> {
    writeln!(out, "number,offset,size,packets,il_size,thin,hash")?;
    let mut rows = 0;
    let mut next_offset = 0;
    for entry in archive {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                log::warn!(
                    "Damaged framing at offset {} after record #{}: {}",
                    next_offset,
                    rows,
                    error
                );
                writeln!(out, "# damaged framing at offset {next_offset}: {error}")?;
                break;
            }
        };
        rows += 1;
        next_offset = entry.offset + entry.data.len() as u64;
        match entry.context() {
            Ok(mc) => {
                let il_size = mc
                    .il_code()
                    .map(|il| il.len().to_string())
                    .unwrap_or_default();
                writeln!(
                    out,
                    "{},{},{},{},{},{},{}",
                    entry.number,
                    entry.offset,
                    entry.data.len(),
                    mc.packet_counts().len(),
                    il_size,
                    mc.is_thin(),
                    entry.hash()
                )?;
            }
            Err(error) => {
                log::warn!("Method context #{} does not parse: {}", entry.number, error);
                writeln!(
                    out,
                    "{},{},{},,,,",
                    entry.number,
                    entry.offset,
                    entry.data.len()
                )?;
            }
        }
    }
    Ok(rows)
}

/// Writes a readable listing of every record and its packets.
///
/// # Errors
/// Failures writing to `out`.
pub fn dump<W: Write>(archive: &Archive, out: &mut W) -> Result<()> {
    for entry in archive {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                writeln!(out, "damaged framing: {error}")?;
                break;
            }
        };

        writeln!(
            out,
            "#{} offset={} size={} hash={}",
            entry.number,
            entry.offset,
            entry.data.len(),
            entry.hash()
        )?;
        let mc = match entry.context() {
            Ok(mc) => mc,
            Err(error) => {
                writeln!(out, "  unreadable: {error}")?;
                continue;
            }
        };

        if mc.is_empty() {
            writeln!(out, "  empty")?;
            continue;
        }
        if let Some(method) = mc.method_handle() {
            writeln!(out, "  method {method:?}")?;
        }
        for (packet, count) in mc.packet_counts() {
            writeln!(out, "  {:<36} {}", packet.name(), count)?;
        }
        match mc.compile_result() {
            Some(cr) => {
                writeln!(out, "  compile result")?;
                for (packet, count) in cr.packet_counts() {
                    let name: &'static str = packet.into();
                    writeln!(out, "    {name:<34} {count}")?;
                }
            }
            None => writeln!(out, "  thin")?,
        }
    }
    Ok(())
}

/// Writes the per-API call counts captured with each record as CSV rows `number,api,count`.
///
/// # Errors
/// Failures writing to `out`.
pub fn method_call_counts<W: Write>(archive: &Archive, out: &mut W) -> Result<()> {
    writeln!(out, "number,api,count")?;
    for entry in archive {
        let Ok(entry) = entry else {
            break;
        };
        let mc = match entry.context() {
            Ok(mc) => mc,
            Err(error) => {
                log::warn!("Method context #{} does not parse: {}", entry.number, error);
                continue;
            }
        };
        let Some(counts) = mc.compile_result().and_then(|cr| cr.call_counts()) else {
            continue;
        };
        for (api, count) in counts {
            writeln!(out, "{},{},{}", entry.number, api, count)?;
        }
    }
    Ok(())
}

/// Writes a table of contents as CSV rows `number,offset,length,hash`.
///
/// # Errors
/// Failures writing to `out`.
pub fn dump_toc<W: Write>(toc: &TableOfContents, out: &mut W) -> Result<()> {
    writeln!(out, "# archive length {}", toc.archive_len())?;
    writeln!(out, "number,offset,length,hash")?;
    for entry in toc.entries() {
        writeln!(
            out,
            "{},{},{},{}",
            entry.number, entry.offset, entry.length, entry.hash
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::tests::{archive_bytes, sample};
    use crate::corinfo::{MethodHandle, MethodInfo};
    use crate::methodcontext::MethodContext;

    fn damaged_archive() -> Vec<u8> {
        let mut bad = sample(2).to_bytes().unwrap();
        // Packet id 0x7777 is unknown, framing stays intact
        bad[6] = 0x77;
        bad[7] = 0x77;
        let mut data = archive_bytes(&[sample(1)]);
        data.extend_from_slice(&bad);
        data.extend_from_slice(&archive_bytes(&[sample(3)]));
        data
    }

    #[test]
    fn integrity_continues_past_bad_records() {
        let archive = Archive::from_mem(damaged_archive());
        let report = integrity_check(&archive, None).unwrap();
        assert_eq!(report.checked, 3);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failed_list().numbers(), &[2]);
        assert_eq!(report.failures[0].kind(), crate::ErrorKind::IntegrityError);
    }

    #[test]
    fn integrity_against_toc() {
        let good = Archive::from_mem(archive_bytes(&[sample(1), sample(2)]));
        let toc = TableOfContents::build(&good).unwrap();
        assert!(integrity_check(&good, Some(&toc)).unwrap().is_ok());

        let mut tampered = archive_bytes(&[sample(1), sample(2)]);
        let swapped = archive_bytes(&[sample(1), sample(9)]);
        assert_eq!(tampered.len(), swapped.len());
        tampered.copy_from_slice(&swapped);
        let report = integrity_check(&Archive::from_mem(tampered), Some(&toc)).unwrap();
        assert_eq!(report.failed_list().numbers(), &[2]);

        let longer = Archive::from_mem(archive_bytes(&[sample(1), sample(2), sample(3)]));
        assert!(matches!(
            integrity_check(&longer, Some(&toc)),
            Err(Error::StaleToc { .. })
        ));
    }

    #[test]
    fn stat_rows() {
        let mut mc = sample(1);
        mc.rec_compile_method(
            &MethodInfo {
                ftn: MethodHandle(0x3000),
                il_code: vec![0x00, 0x2A],
                ..MethodInfo::default()
            },
            0,
        );
        let mut data = archive_bytes(&[mc]);
        data.extend_from_slice(&damaged_archive());
        let archive = Archive::from_mem(data);

        let mut out = Vec::new();
        assert_eq!(stat(&archive, &mut out).unwrap(), 4);
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[1].starts_with("1,0,"));
        assert!(lines[1].contains(",2,true,"));
        assert!(lines[3].ends_with(",,,,"));
    }

    #[test]
    fn stat_notes_damaged_framing() {
        let mut data = archive_bytes(&[sample(1), sample(2)]);
        let good = data.len();
        data.extend_from_slice(b"junk");
        let archive = Archive::from_mem(data);

        let mut out = Vec::new();
        assert_eq!(stat(&archive, &mut out).unwrap(), 2);
        let text = String::from_utf8(out).unwrap();
        let last = text.lines().last().unwrap();
        assert!(last.starts_with(&format!("# damaged framing at offset {good}")));
    }

    #[test]
    fn dump_lists_packets() {
        let mut mc = sample(1);
        mc.compile_result_mut().add_call("getMethodAttribs");
        let archive = Archive::from_mem(archive_bytes(&[mc, sample(2), MethodContext::new()]));

        let mut out = Vec::new();
        dump(&archive, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("#1 offset=0"));
        assert!(text.contains("GetMethodAttribs"));
        assert!(text.contains("compile result"));
        assert!(text.contains("CallCounts"));
        assert!(text.contains("thin"));
        assert!(text.trim_end().ends_with("  empty"));
    }

    #[test]
    fn call_count_csv() {
        let mut mc = MethodContext::new();
        mc.compile_result_mut().add_call("resolveToken");
        mc.compile_result_mut().add_call("resolveToken");
        mc.compile_result_mut().add_call("canInline");
        let archive = Archive::from_mem(archive_bytes(&[sample(1), mc]));

        let mut out = Vec::new();
        method_call_counts(&archive, &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "number,api,count\n2,canInline,1\n2,resolveToken,2\n"
        );
    }

    #[test]
    fn toc_csv() {
        let archive = Archive::from_mem(archive_bytes(&[sample(1)]));
        let toc = TableOfContents::build(&archive).unwrap();
        let mut out = Vec::new();
        dump_toc(&toc, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let expected = format!("1,0,{},{}", archive.len(), toc.entries()[0].hash);
        assert!(text.lines().any(|line| line == expected));
    }
}
