//! Pure helpers for Device Farm ARNs and console URLs.
//!
//! A run ARN looks like
//! `arn:aws:devicefarm:us-west-2:123456789012:run:<first>/<second>`.
//! The seventh `:`-separated field holds the two identifiers.

/// Splits the identifier field of a run ARN into its `/`-separated parts.
///
/// Returns `None` when the ARN has fewer than seven fields.
pub fn split_run_arn(arn: &str) -> Option<Vec<&str>> {
    arn.split(':').nth(6).map(|ids| ids.split('/').collect())
}

/// Returns the run identifier of a run ARN.
///
/// ```
/// use devicefarm::arn::run_id_from_arn;
///
/// assert_eq!(run_id_from_arn("arn:1:2:3:4:5:runarn/projarn"), Some("runarn"));
/// ```
pub fn run_id_from_arn(arn: &str) -> Option<&str> {
    split_run_arn(arn).and_then(|parts| parts.first().copied())
}

/// Returns the project identifier of a run ARN.
///
/// ```
/// use devicefarm::arn::project_id_from_arn;
///
/// assert_eq!(project_id_from_arn("arn:1:2:3:4:5:runarn/projarn"), Some("projarn"));
/// ```
pub fn project_id_from_arn(arn: &str) -> Option<&str> {
    split_run_arn(arn).and_then(|parts| parts.get(1).copied())
}

/// Fills a console URL template with the project and run identifiers.
///
/// The template uses two positional `%s` placeholders, project first. Any
/// placeholder without a value is left empty. An ARN that cannot be split
/// yields the template with both placeholders blanked.
pub fn run_url_from_arn(template: &str, arn: &str) -> String {
    let mut values = [project_id_from_arn(arn), run_id_from_arn(arn)].into_iter();
    let mut url = String::with_capacity(template.len() + arn.len());
    let mut rest = template;

    while let Some(idx) = rest.find("%s") {
        url.push_str(&rest[..idx]);
        if let Some(Some(value)) = values.next() {
            url.push_str(value);
        }
        rest = &rest[idx + 2..];
    }
    url.push_str(rest);
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    const RUN_ARN: &str = "arn:1:2:3:4:5:runarn/projarn";

    #[test]
    fn test_split_run_arn() {
        assert_eq!(split_run_arn(RUN_ARN), Some(vec!["runarn", "projarn"]));
        assert_eq!(split_run_arn("arn:too:short"), None);
    }

    #[test]
    fn test_ids_from_arn() {
        assert_eq!(run_id_from_arn(RUN_ARN), Some("runarn"));
        assert_eq!(project_id_from_arn(RUN_ARN), Some("projarn"));
    }

    #[test]
    fn test_missing_second_id() {
        assert_eq!(run_id_from_arn("arn:1:2:3:4:5:only"), Some("only"));
        assert_eq!(project_id_from_arn("arn:1:2:3:4:5:only"), None);
    }

    #[test]
    fn test_run_url_from_arn() {
        let url = run_url_from_arn("https://console/projects/%s/runs/%s", RUN_ARN);
        assert_eq!(url, "https://console/projects/projarn/runs/runarn");
    }

    #[test]
    fn test_run_url_from_bad_arn() {
        let url = run_url_from_arn("https://console/%s/%s/x", "nonsense");
        assert_eq!(url, "https://console///x");
    }
}
