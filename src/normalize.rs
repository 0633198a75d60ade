/// Folds a word or query into its comparison form.
///
/// Turkish casing is applied before the generic Unicode lowercase so that
/// `İ` folds to `i` and `I` folds to the dotless `ı`. The result is only ever
/// used for comparison; display always uses the stored key.
pub fn normalize(text: &str) -> String {
    let mut folded = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            'İ' => folded.push('i'),
            'I' => folded.push('ı'),
            other => folded.push(other),
        }
    }
    folded.to_lowercase()
}
