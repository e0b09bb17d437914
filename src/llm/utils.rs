/// Most pages listed in a focus note; longer lists are cut.
const MAX_FOCUS_PAGES: usize = 120;

/// Prepends the located statement pages to an extraction prompt. Page
/// numbers stay those of the full report.
pub fn with_focus_pages(prompt: &str, pages: &[u32]) -> String {
    if pages.is_empty() {
        return prompt.to_string();
    }
    let listed: Vec<String> = pages
        .iter()
        .take(MAX_FOCUS_PAGES)
        .map(|p| p.to_string())
        .collect();
    format!(
        "NOTE: The consolidated statements were located on these physical PDF pages: {}.\n\
         Read those pages first. When you return source.page, use the physical page number of the FULL document.\n\n{}",
        listed.join(", "),
        prompt
    )
}

/// Pins a targeted re-query to the fiscal year whose record it repairs.
/// Comparative reports show several years side by side.
pub fn for_fiscal_year(prompt: &str, year_label: &str) -> String {
    let year_label = year_label.trim();
    if year_label.is_empty() {
        return prompt.to_string();
    }
    format!(
        "NOTE: Extract the figure for fiscal year {} only. Ignore other year columns.\n\n{}",
        year_label, prompt
    )
}
