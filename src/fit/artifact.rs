//! Named numeric outputs of a fit (`artifact_data`).
//!
//! Each output is a name plus one or more flat numeric fields. Exports merge
//! every field into one table column headed `<output>_<field>` (or just
//! `<output>` for single unnamed fields), so no output overwrites another.

/// One named output, e.g. `gcv` with fields `xpred`, `ypred`, `std_t`.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedOutput {
    pub name: String,
    /// `(field, values)`; an empty field name means "the output itself".
    pub fields: Vec<(String, Vec<f64>)>,
}

impl NamedOutput {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Output that is a single flat sequence.
    pub fn flat(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self::new(name).with_field("", values)
    }

    pub fn with_field(mut self, field: impl Into<String>, values: Vec<f64>) -> Self {
        self.fields.push((field.into(), values));
        self
    }

    pub fn field(&self, field: &str) -> Option<&[f64]> {
        self.fields
            .iter()
            .find(|(f, _)| f == field)
            .map(|(_, v)| v.as_slice())
    }

    fn column_header(&self, field: &str) -> String {
        if field.is_empty() {
            self.name.clone()
        } else {
            format!("{}_{}", self.name, field)
        }
    }
}

/// Ordered collection of named outputs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArtifactData {
    outputs: Vec<NamedOutput>,
}

impl ArtifactData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an output, replacing any earlier output of the same name in place.
    pub fn push(&mut self, output: NamedOutput) {
        match self.outputs.iter_mut().find(|o| o.name == output.name) {
            Some(slot) => *slot = output,
            None => self.outputs.push(output),
        }
    }

    pub fn with(mut self, output: NamedOutput) -> Self {
        self.push(output);
        self
    }

    pub fn get(&self, name: &str) -> Option<&NamedOutput> {
        self.outputs.iter().find(|o| o.name == name)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> Vec<&str> {
        self.outputs.iter().map(|o| o.name.as_str()).collect()
    }

    pub fn outputs(&self) -> &[NamedOutput] {
        &self.outputs
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.iter().all(|o| o.fields.is_empty())
    }

    /// Every field as a `(header, values)` column, in output order.
    pub fn merged_columns(&self) -> Vec<(String, &[f64])> {
        self.outputs
            .iter()
            .flat_map(|o| {
                o.fields
                    .iter()
                    .map(move |(field, values)| (o.column_header(field), values.as_slice()))
            })
            .collect()
    }

    /// Length of the longest column.
    pub fn merged_rows(&self) -> usize {
        self.outputs
            .iter()
            .flat_map(|o| o.fields.iter().map(|(_, v)| v.len()))
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merged_columns_prefix_output_names() {
        let data = ArtifactData::new()
            .with(
                NamedOutput::new("reml")
                    .with_field("xpred", vec![0.0, 1.0])
                    .with_field("ypred", vec![2.0, 3.0]),
            )
            .with(NamedOutput::flat("freq_low", vec![1.0, 1.0, 1.0]));

        let headers: Vec<String> = data.merged_columns().into_iter().map(|(h, _)| h).collect();
        assert_eq!(headers, vec!["reml_xpred", "reml_ypred", "freq_low"]);
        assert_eq!(data.merged_rows(), 3);
    }

    #[test]
    fn push_replaces_same_name() {
        let mut data = ArtifactData::new();
        data.push(NamedOutput::flat("gcv", vec![1.0]));
        data.push(NamedOutput::flat("gcv", vec![2.0]));
        assert_eq!(data.names(), vec!["gcv"]);
        assert_eq!(data.get("gcv").unwrap().field(""), Some(&[2.0][..]));
    }

    #[test]
    fn empty_outputs_count_as_empty() {
        assert!(ArtifactData::new().is_empty());
        assert!(ArtifactData::new().with(NamedOutput::new("x")).is_empty());
    }
}
