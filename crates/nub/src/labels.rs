/// Source of unique assembly labels and IR value names.
///
/// One generator is created per compilation and handed to every stage that
/// mints names. The counter is monotonic and never reset, so every name it
/// produces is unique for the lifetime of the compilation.
#[derive(Debug, Default)]
pub struct LabelGenerator {
    next: u32,
}

impl LabelGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(&mut self) -> u32 {
        let n = self.next;
        self.next += 1;
        n
    }

    /// `prefix` followed by the next counter value, e.g. `if_end_12`.
    pub fn next_label(&mut self, prefix: &str) -> String {
        format!("{prefix}_{}", self.bump())
    }

    /// Label for a non-exported function; keeps the source name readable.
    pub fn function_label(&mut self, name: &str) -> String {
        format!("nub_{name}_{}", self.bump())
    }

    /// Fresh SSA value name (without the IR sigil).
    pub fn next_temp(&mut self) -> String {
        format!("t{}", self.bump())
    }
}
