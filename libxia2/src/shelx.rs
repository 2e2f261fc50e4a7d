use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::error::ShelxError;

/// One reflection of a SHELX HKLF 4 file
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reflection {
    pub h: i32,
    pub k: i32,
    pub l: i32,
    pub intensity: f64,
    pub sigma: f64,
}

impl Reflection {
    /// The fixed width HKLF 4 record, without the newline
    pub fn hklf4_record(&self) -> String {
        format!(
            "{:4}{:4}{:4}{:8.2}{:8.2}",
            self.h, self.k, self.l, self.intensity, self.sigma
        )
    }
}

fn push_element(counts: &mut BTreeMap<String, u32>, element: &str, number: &str) -> Result<(), ShelxError> {
    let count = if number.is_empty() {
        1
    } else {
        number
            .parse::<u32>()
            .map_err(|e| ShelxError::BadInteger(0, e))?
    };
    *counts.entry(element.to_string()).or_insert(0) += count;
    Ok(())
}

/// Count the atoms of each element in a formula such as `C6H12O6`
pub fn parse_compound(compound: &str) -> Result<BTreeMap<String, u32>, ShelxError> {
    let mut counts: BTreeMap<String, u32> = BTreeMap::new();
    let mut element = String::new();
    let mut number = String::new();
    for c in compound.chars() {
        if c.is_ascii_uppercase() {
            if !element.is_empty() {
                push_element(&mut counts, &element, &number)?;
            }
            element = c.to_string();
            number.clear();
        } else if c.is_ascii_lowercase() && !element.is_empty() && number.is_empty() {
            element.push(c);
        } else if c.is_ascii_digit() && !element.is_empty() {
            number.push(c);
        } else if !c.is_whitespace() {
            return Err(ShelxError::BadCompound(c));
        }
    }
    if !element.is_empty() {
        push_element(&mut counts, &element, &number)?;
    }
    Ok(counts)
}

/// Read reflections from whitespace separated `h k l I sigI` text. Blank lines and lines
/// starting with `#` are skipped.
pub fn read_reflections(path: &Path) -> Result<Vec<Reflection>, ShelxError> {
    let contents = std::fs::read_to_string(path)?;
    let mut reflections = Vec::new();
    for (index, line) in contents.lines().enumerate() {
        let line_number = index + 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() != 5 {
            return Err(ShelxError::BadRecord(line_number));
        }
        let int = |token: &str| {
            token
                .parse::<i32>()
                .map_err(|e| ShelxError::BadInteger(line_number, e))
        };
        let float = |token: &str| {
            token
                .parse::<f64>()
                .map_err(|e| ShelxError::BadFloat(line_number, e))
        };
        reflections.push(Reflection {
            h: int(tokens[0])?,
            k: int(tokens[1])?,
            l: int(tokens[2])?,
            intensity: float(tokens[3])?,
            sigma: float(tokens[4])?,
        });
    }
    Ok(reflections)
}

/// Write reflections as a SHELX HKLF 4 file. Returns the number written.
pub fn write_hklf4(reflections: &[Reflection], output: &Path) -> Result<usize, ShelxError> {
    let mut writer = BufWriter::new(File::create(output)?);
    for reflection in reflections {
        writeln!(writer, "{}", reflection.hklf4_record())?;
    }
    writer.flush()?;
    spdlog::info!(
        "Wrote {} reflections to {}",
        reflections.len(),
        output.display()
    );
    Ok(reflections.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_compound() {
        let glucose = parse_compound("C6H12O6").unwrap();
        assert_eq!(glucose["C"], 6);
        assert_eq!(glucose["H"], 12);
        assert_eq!(glucose["O"], 6);

        let salt = parse_compound("NaCl").unwrap();
        assert_eq!(salt.len(), 2);
        assert_eq!(salt["Na"], 1);
        assert_eq!(salt["Cl"], 1);

        // Repeated elements accumulate
        let acid = parse_compound("CH3COOH").unwrap();
        assert_eq!(acid["C"], 2);
        assert_eq!(acid["H"], 4);
        assert_eq!(acid["O"], 2);

        assert!(parse_compound("").unwrap().is_empty());
        assert!(matches!(parse_compound("C6(H2O)"), Err(ShelxError::BadCompound('('))));
        assert!(matches!(parse_compound("6C"), Err(ShelxError::BadCompound('6'))));
    }

    #[test]
    fn test_hklf4_records() {
        let reflection = Reflection {
            h: -12,
            k: 3,
            l: 104,
            intensity: 1234.567,
            sigma: 12.3,
        };
        assert_eq!(reflection.hklf4_record(), " -12   3 104 1234.57   12.30");
    }

    #[test]
    fn test_text_to_hklf4() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("reflections.txt");
        std::fs::write(&input, "# h k l I sigI\n1 0 0 100.0 5.0\n\n0 2 -1 -3.5 1.25\n").unwrap();
        let reflections = read_reflections(&input).unwrap();
        assert_eq!(reflections.len(), 2);

        let output = dir.path().join("lysozyme.hkl");
        assert_eq!(write_hklf4(&reflections, &output).unwrap(), 2);
        assert_eq!(
            std::fs::read_to_string(&output).unwrap(),
            "   1   0   0  100.00    5.00\n   0   2  -1   -3.50    1.25\n"
        );
    }

    #[test]
    fn test_bad_reflection_records() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("reflections.txt");
        std::fs::write(&input, "1 0 0 100.0\n").unwrap();
        assert!(matches!(read_reflections(&input), Err(ShelxError::BadRecord(1))));
        std::fs::write(&input, "1 0 0 100.0 5.0\n1 x 0 1.0 1.0\n").unwrap();
        assert!(matches!(
            read_reflections(&input),
            Err(ShelxError::BadInteger(2, _))
        ));
    }
}
