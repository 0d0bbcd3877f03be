use anyhow::{Context, Result, bail};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Instant;

use crate::bag;
use crate::config::ExportConfig;
use crate::dispatcher::{Dispatch, Dispatcher, TopicSummary};
use crate::metadata::JsonMetadataEmitter;

/// Options for exporting a ROS bag into per-topic artifact directories
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Parsed export configuration (bag, output directory, topics)
    pub config: ExportConfig,
    /// Dry run: route and sample records but write nothing
    pub dry_run: bool,
    /// Show progress spinner
    pub show_progress: bool,
}

/// Export every configured topic of a bag.
///
/// Fatal errors are limited to an unreadable configuration, an unreadable
/// bag, an output directory that cannot be created and a metadata file that
/// cannot be written. Per-message failures only leave gaps in a topic's
/// index.
///
/// # Example
///
/// ```rust,no_run
/// use bag2export::{ExportConfig, ExportOptions, export_bag};
///
/// let options = ExportOptions {
///     config: ExportConfig::from_path("export.yaml")?,
///     dry_run: false,
///     show_progress: true,
/// };
///
/// for topic in export_bag(&options)? {
///     println!("{}: {} files", topic.topic, topic.written);
/// }
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn export_bag(options: &ExportOptions) -> Result<Vec<TopicSummary>> {
    let config = &options.config;
    if config.bag_path.trim().is_empty() {
        bail!("no bag given (set bag_path in the config or pass --bag)");
    }
    if config.output_dir.as_os_str().is_empty() {
        bail!("no output directory given (set output_dir in the config or pass --out)");
    }

    let topics = config.topic_configs()?;
    if topics.is_empty() {
        tracing::warn!("no topics configured; nothing will be exported");
    }

    if !options.dry_run {
        std::fs::create_dir_all(&config.output_dir)
            .with_context(|| format!("failed to create output directory: {}", config.output_dir.display()))?;
    }

    let mut dispatcher = Dispatcher::new(&topics).with_dry_run(options.dry_run);

    let pb = if options.show_progress {
        let pb = ProgressBar::new_spinner();
        pb.set_style(ProgressStyle::with_template("{spinner} {pos} msgs")?);
        Some(pb)
    } else {
        None
    };

    let t0 = Instant::now();
    let mut unknown = 0u64;
    let total = bag::for_each_record(&config.bag_path, config.stamp_source, |record| {
        if dispatcher.dispatch(record) == Dispatch::UnknownTopic {
            unknown += 1;
        }
        if let Some(pb) = &pb {
            pb.inc(1);
        }
        Ok(())
    })?;
    if let Some(pb) = &pb {
        pb.finish_and_clear();
    }

    let summary = if options.dry_run {
        dispatcher.summary()
    } else {
        let mut emitter = JsonMetadataEmitter::new(
            &config.output_dir,
            &config.bag_path,
            config.metadata.primary_topic.clone(),
        );
        dispatcher.finish(&mut emitter)?
    };

    tracing::info!(
        bag = %config.bag_path,
        messages = total,
        ignored = unknown,
        elapsed = ?t0.elapsed(),
        dry_run = options.dry_run,
        "export finished"
    );
    for topic in &summary {
        tracing::info!(
            topic = %topic.topic,
            received = topic.received,
            written = topic.written,
            dropped = topic.dropped(),
            skipped = topic.sampled_out,
            "topic summary"
        );
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(yaml: &str) -> ExportOptions {
        ExportOptions {
            config: ExportConfig::from_yaml_str(yaml).unwrap(),
            dry_run: false,
            show_progress: false,
        }
    }

    #[test]
    fn test_missing_bag_path_rejected() {
        let err = export_bag(&options("output_dir: /tmp/out\n")).unwrap_err();
        assert!(err.to_string().contains("no bag given"));
    }

    #[test]
    fn test_missing_output_dir_rejected() {
        let err = export_bag(&options("bag_path: run.bag\n")).unwrap_err();
        assert!(err.to_string().contains("no output directory"));
    }

    #[test]
    fn test_invalid_topic_is_fatal() {
        let yaml = "bag_path: run.bag\noutput_dir: /tmp/out\ntopics:\n  - name: /gps\n    type: GPS\n    sample_interval: 0\n";
        let err = export_bag(&options(yaml)).unwrap_err();
        assert!(err.to_string().contains("sample_interval"));
    }

    #[test]
    fn test_unreadable_bag_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let yaml = format!(
            "bag_path: {}\noutput_dir: {}\n",
            tmp.path().join("missing.bag").display(),
            tmp.path().join("out").display()
        );
        let err = export_bag(&options(&yaml)).unwrap_err();
        assert!(format!("{:#}", err).contains("failed to open bag"));
        // the output root is created before the bag is read
        assert!(tmp.path().join("out").is_dir());
    }

    #[test]
    fn test_uncreatable_output_root_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let yaml = format!("bag_path: run.bag\noutput_dir: {}\n", blocker.join("out").display());
        let err = export_bag(&options(&yaml)).unwrap_err();
        assert!(err.to_string().contains("failed to create output directory"));
    }
}
