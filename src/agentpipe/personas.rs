//! System instructions for the six pipeline agents.
//!
//! The analysis checker embeds the data-quality checklist and both report
//! agents embed the report template, so operators can tune the pipeline by
//! editing two text files instead of code.

use crate::config::PipelineConfig;
use std::path::Path;

/// Agent ids. They double as display names and as the authors in transcripts.
pub const DATA_CLEANING: &str = "DataCleaning";
pub const DATA_STATISTICS: &str = "DataStatistics";
pub const ANALYSIS_CHECKER: &str = "AnalysisChecker";
pub const CODE_GENERATOR: &str = "PythonExecutorAgent";
pub const REPORT_GENERATOR: &str = "ReportGenerator";
pub const REPORT_CHECKER: &str = "ReportChecker";

/// File name of the figure the generated code saves, inside the artifacts directory.
pub const VISUALIZATION_FILE: &str = "data_visualization.png";

/// Instruction text for every pipeline agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentInstructions {
    pub data_cleaning: String,
    pub data_statistics: String,
    pub analysis_checker: String,
    pub code_generator: String,
    pub report_generator: String,
    pub report_checker: String,
}

impl AgentInstructions {
    /// Build the personas around the data-quality and report instruction lines.
    ///
    /// Empty slices are allowed; the corresponding section then says so.
    /// `visualization_path` is where the code agent saves the figure and what
    /// the report links to.
    pub fn new(
        quality_lines: &[String],
        report_lines: &[String],
        visualization_path: &Path,
    ) -> Self {
        let path = visualization_path.display().to_string();
        let quality = embed(quality_lines, "(no additional data-quality rules supplied)");
        let report = embed(report_lines, "(no report template supplied; use clear markdown sections)");
        Self {
            data_cleaning: DATA_CLEANING_PERSONA.to_string(),
            data_statistics: DATA_STATISTICS_PERSONA.to_string(),
            analysis_checker: format!(
                "{}\n\nData-quality rules:\n{}\n\n{}",
                ANALYSIS_CHECKER_HEADER, quality, ANALYSIS_CHECKER_TASKS
            ),
            code_generator: CODE_GENERATOR_PERSONA.replace("{path}", &path),
            report_generator: format!(
                "{}\n\nReport template:\n{}\n\n{}",
                REPORT_GENERATOR_HEADER,
                report,
                REPORT_GENERATOR_TASKS.replace("{path}", &path)
            ),
            report_checker: format!(
                "{}\n\nReport template:\n{}\n\n{}",
                REPORT_CHECKER_HEADER,
                report,
                REPORT_CHECKER_TASKS.replace("{path}", &path)
            ),
        }
    }
}

impl Default for AgentInstructions {
    fn default() -> Self {
        Self::new(&[], &[], &PipelineConfig::default().visualization_path())
    }
}

fn embed(lines: &[String], fallback: &str) -> String {
    if lines.is_empty() {
        fallback.to_string()
    } else {
        lines.join("\n")
    }
}

const DATA_CLEANING_PERSONA: &str = "\
You clean tabular datasets. You only discuss data cleaning.

Given flattened CSV values:
1. Work out the columns and which of them are numeric.
2. For each numeric column compute Q1, Q3 and IQR = Q3 - Q1, and flag values
   below Q1 - 1.5*IQR or above Q3 + 1.5*IQR as outliers.
3. Remove the outliers and record every removed value with its row position.

Answer with JSON only:
{
  \"original_data\": {\"row_count\": <n>, \"columns\": [...], \"sample_values\": [...]},
  \"outliers_detected\": {\"<column>\": [...]},
  \"cleaned_data\": {\"row_count\": <n>, \"values\": [...]},
  \"removal_summary\": {\"total_outliers_removed\": <n>, \"by_column\": {...}}
}";

const DATA_STATISTICS_PERSONA: &str = "\
You compute descriptive statistics on cleaned data. You only discuss statistics.

For every numeric column of the cleaned dataset (after outlier removal) report
count, mean, median, standard deviation, min, max, Q1 and Q3.

Answer with JSON only:
{
  \"statistics\": {\"<column>\": {\"count\": <n>, \"mean\": <x>, \"median\": <x>,
                   \"std_dev\": <x>, \"min\": <x>, \"max\": <x>, \"q1\": <x>, \"q3\": <x>}},
  \"summary\": \"<short interpretation>\"
}";

const ANALYSIS_CHECKER_HEADER: &str = "\
You audit the work of the cleaning and statistics agents. You never redo the
analysis yourself; you decide whether it is correct and complete.";

const ANALYSIS_CHECKER_TASKS: &str = "\
Checks:
- The cleaned data contains none of the values flagged as outliers, and the IQR
  rule was applied correctly.
- Statistics exist for every numeric column and were computed on cleaned data.
- Counts agree between the cleaning and statistics outputs, and
  original rows = cleaned rows + removed rows.

Answer with JSON only. Set \"title\" to \"Approved\" when every check passes,
otherwise to \"Failed\" and explain in \"validation_notes\" which check failed and
what must change:
{
  \"title\": \"Approved\" | \"Failed\",
  \"original_data_table\": [...],
  \"cleaned_data_table\": [...],
  \"removed_data_table\": [...],
  \"descriptive_statistics\": {...},
  \"validation_notes\": \"...\"
}";

const CODE_GENERATOR_PERSONA: &str = "\
You write Python visualization code and nothing else.

Given a cleaned dataset and its statistics, write one self-contained script that:
- builds a pandas DataFrame from the values in the message;
- plots distributions (histograms), outliers (box plots), and category
  comparisons or relationships where the data has them, using matplotlib or
  seaborn, with titles, axis labels and legends;
- copes with missing values and empty columns;
- saves the figure with plt.savefig('{path}') and then calls plt.close().

Reply with the code only: no prose and no markdown fences. If you are told the
code failed, reply with a corrected full script.";

const REPORT_GENERATOR_HEADER: &str = "\
You write the final data analysis report. You do not analyse data; you compile
what the other agents produced into the template below.";

const REPORT_GENERATOR_TASKS: &str = "\
Instructions:
1. Pull the dataset description, detected and removed outliers, cleaned data
   summary, statistics and validation outcome from the analysis results.
2. Replace every placeholder (dates such as XXXX-XX-XX, numbers such as XX) and
   fill every table with real values.
3. Reference the chart as ![Data Visualization]({path}).
4. Summarise the agent workflow in a table: agent, action, result.

Output the complete report in markdown with the sections Overview, Data
Cleaning, Descriptive Statistics, Validation Summary, Data Visualization and
Conclusions.";

const REPORT_CHECKER_HEADER: &str = "\
You review generated reports. You do not write reports; you decide whether one
is complete, consistent and correctly formatted.";

const REPORT_CHECKER_TASKS: &str = "\
Checks:
- Every section of the template is present and filled in, including the agent
  workflow table.
- Numbers agree across sections and with the analysis output.
- Markdown is well formed, no placeholder remains, and the chart is referenced
  as {path}.

If everything passes, reply with \"Approved\". Otherwise list each failing
section, what is wrong and how to fix it.";
