use std::collections::{BTreeMap, BTreeSet};
use std::io::{Read, Write};

/// Maps the free-form account labels that show up in recording sources
/// (mail-style aliases, legacy suffixed codes) to canonical account ids
/// like `Z09`. Round-trips as a flat JSON object of `label: code`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AliasTable {
    aliases: BTreeMap<String, String>,
    codes: BTreeSet<String>,
    retired: BTreeSet<String>,
}

impl AliasTable {
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut table = Self::default();
        for (label, code) in pairs {
            table.insert(label, code);
        }
        table
    }

    /// The production mapping, including the data-entry variants that
    /// accumulated over the years.
    pub fn builtin() -> Self {
        let mut table = Self::from_pairs(
            [
                ("MNCCS.zoom.04@gmail.com", "Z12"),
                ("z1@thinklandai.com", "Z01"),
                ("z2@thinklandai.com", "Z02"),
                ("z3@thinklandai.com", "Z03"),
                ("z4@thinklandai.com", "Z04"),
                ("z5@thinklandai.com", "Z05"),
                ("teach@thinkland.ai", "Z06"),
                ("z7@thinklandai.com", "Z07"),
                ("z8@thinklandai.com", "Z08"),
                ("z9@thinklandai.com", "Z09"),
                ("z10@thinklandai.com", "Z10"),
                ("z11@thinklandai.com", "Z11"),
                ("cnscc16@chicagochinesecenter.com", "Z13"),
                ("cnscc17@chicagochinesecenter.com", "Z14"),
                ("hcsgb_minor@hopechineseschool.org", "Z16"),
                ("enrichmentclass2@tvcs.ngo", "Z18"),
                ("enrichmentclass3@tvcs.ngo", "Z19"),
                ("Z01-TL", "Z01"),
                ("Z02-TL", "Z02"),
                ("Z03-TL", "Z03"),
                ("Z04-TL", "Z04"),
                ("Z05-TL", "Z05"),
                ("Z06-TL0", "Z06"),
                ("Z07-TL", "Z07"),
                ("Z08-TL", "Z08"),
                ("Z10-TL", "Z10"),
                ("Z11-TL", "Z11"),
                ("Z13-CNSCC16", "Z13"),
                ("Z14-CNSCC17", "Z14"),
            ]
            .into_iter()
            .map(|(label, code)| (label.to_string(), code.to_string())),
        );
        for label in [
            "sqinga3@bostoncccc.org",
            "teachersun.hxbg@gmail.com",
            "aicode1@huaxiabh.org",
        ] {
            table.retire(label);
        }
        table
    }

    pub fn insert(&mut self, label: String, code: String) {
        self.codes.insert(code.clone());
        self.aliases.insert(label, code);
    }

    /// Marks a label as belonging to an account no longer in service.
    pub fn retire(&mut self, label: &str) {
        self.retired.insert(label.to_string());
    }

    pub fn is_retired(&self, label: &str) -> bool {
        self.retired.contains(label)
    }

    /// True when `value` already is a canonical code, i.e. appears as a
    /// mapped-to value of the table.
    pub fn is_canonical(&self, value: &str) -> bool {
        self.codes.contains(value)
    }

    /// Canonical form of `raw`: the mapped code for a known alias, the
    /// value itself otherwise. Idempotent over canonical codes.
    pub fn canonicalize<'a>(&'a self, raw: &'a str) -> &'a str {
        match self.aliases.get(raw) {
            Some(code) => code,
            None => raw,
        }
    }

    /// Canonical form of `raw`, or `None` when it is neither a known
    /// alias nor already canonical.
    pub fn resolve(&self, raw: &str) -> Option<&str> {
        if let Some(code) = self.aliases.get(raw) {
            return Some(code);
        }
        self.codes.get(raw).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    pub fn from_json_reader<R: Read>(reader: R) -> anyhow::Result<Self> {
        let pairs: BTreeMap<String, String> = serde_json::from_reader(reader)?;
        Ok(Self::from_pairs(pairs))
    }

    pub fn to_json_writer<W: Write>(&self, writer: W) -> anyhow::Result<()> {
        serde_json::to_writer_pretty(writer, &self.aliases)?;
        Ok(())
    }
}

/// Best-effort repair of a mistyped account prefix, e.g. from a download
/// directory named `z9-1223`. Upcases a leading lowercase letter, inserts
/// the missing zero in single-digit forms like `Z5` or `Z5x…`, and cuts
/// the result to three characters. Returns the input unchanged when no
/// rule applies.
pub fn repair_format(prefix: &str) -> String {
    let mut chars: Vec<char> = prefix.chars().collect();
    if let Some(first) = chars.first_mut() {
        if first.is_ascii_lowercase() {
            *first = first.to_ascii_uppercase();
        }
    }
    if chars.len() == 2 && chars[1].is_ascii_digit() {
        return format!("{}0{}", chars[0], chars[1]);
    }
    if chars.len() >= 3 && chars[1].is_ascii_digit() && !chars[2].is_ascii_digit() {
        return format!("{}0{}", chars[0], chars[1]);
    }
    chars.into_iter().take(3).collect()
}
