//! Turns CLI requests into job specs.
//!
//! Fetch plans are pure string assembly; remux and demux plans probe the
//! inputs first to learn durations and stream layouts.

use std::path::{Path, PathBuf};

use thiserror::Error;

use mediamux_core::{
    GroupId, JobCommand, JobSpec, MediaProber, ProbeCache, ProbeError, ProgressSource, StreamInfo,
    ToolsConfig,
};

#[derive(Debug, Error)]
pub enum PlanError {
    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error("{path} has no usable audio or video streams")]
    NoStreams { path: PathBuf },
}

/// Builds job specs for one invocation. Holds the probe cache so several
/// plans over the same inputs probe each file once.
pub struct Planner<'a, P: MediaProber> {
    pub tools: &'a ToolsConfig,
    pub cache: &'a ProbeCache<P>,
    pub out_dir: &'a Path,
    pub overwrite: bool,
}

impl<'a, P: MediaProber> Planner<'a, P> {
    /// One yt-dlp job per URL. Download progress comes from yt-dlp's
    /// `[download] NN.N%` lines; the final filename is the tool's choice,
    /// so no output path is recorded.
    pub fn plan_fetch(
        &self,
        urls: &[String],
        format: &str,
        merge_format: Option<&str>,
    ) -> Vec<JobSpec> {
        let template = self
            .out_dir
            .join("%(title)s.%(ext)s")
            .to_string_lossy()
            .into_owned();

        urls.iter()
            .map(|url| {
                let mut args = vec![
                    "-f".to_string(),
                    format.to_string(),
                    "--newline".to_string(),
                    "-o".to_string(),
                    template.clone(),
                ];
                if let Some(merge) = merge_format {
                    args.push("--merge-output-format".to_string());
                    args.push(merge.to_string());
                }
                args.push(url.clone());

                JobSpec::new(url.clone(), JobCommand::new(&self.tools.ytdlp, args))
                    .with_progress(ProgressSource::PercentMarkers)
            })
            .collect()
    }

    /// One stream-copy ffmpeg job per input, into the target container.
    pub async fn plan_remux(
        &self,
        inputs: &[PathBuf],
        container: &str,
    ) -> Result<Vec<JobSpec>, PlanError> {
        let mut jobs = Vec::with_capacity(inputs.len());
        for input in inputs {
            let info = self.cache.get(input).await?;
            let output = self.unique_output(&format!("{}.{container}", stem_of(input)));

            let mut args = self.ffmpeg_prefix(input);
            args.extend(["-map", "0", "-c", "copy"].map(String::from));
            args.extend(self.ffmpeg_suffix(&output));

            jobs.push(
                JobSpec::new(
                    format!("remux {}", file_name(input)),
                    JobCommand::new(&self.tools.ffmpeg, args),
                )
                .with_progress(ProgressSource::MediaTime {
                    duration_secs: info.duration_secs,
                })
                .with_output_path(output),
            );
        }
        Ok(jobs)
    }

    /// Per input: one job for the default video stream and one per audio
    /// stream, all sharing the input's group. Streams are copied when the
    /// codec already matches the target and re-encoded otherwise.
    pub async fn plan_demux(
        &self,
        inputs: &[PathBuf],
        audio_format: &str,
        video_format: &str,
        force_reencode: bool,
    ) -> Result<Vec<JobSpec>, PlanError> {
        let mut jobs = Vec::new();
        for input in inputs {
            let info = self.cache.get(input).await?;
            let group = GroupId::new();
            let progress = ProgressSource::MediaTime {
                duration_secs: info.duration_secs,
            };
            let mut planned_any = false;

            if let Some(video) = info.default_video_stream() {
                let output =
                    self.unique_output(&format!("{}.{video_format}", stem_of(input)));
                let codec_args = video_codec_args(&video.codec, video_format, force_reencode);

                let mut args = self.ffmpeg_prefix(input);
                args.extend(["-map".to_string(), format!("0:{}", video.index)]);
                args.extend(codec_args);
                args.extend(self.ffmpeg_suffix(&output));

                jobs.push(
                    JobSpec::new(
                        format!("{} video", file_name(input)),
                        JobCommand::new(&self.tools.ffmpeg, args),
                    )
                    .with_progress(progress.clone())
                    .with_group(group.clone())
                    .with_output_path(output),
                );
                planned_any = true;
            }

            for audio in info.audio_streams() {
                let target = AudioTarget::resolve(audio_format, &audio.codec, force_reencode);
                let tag = audio_tag(audio);
                let output = self.unique_output(&format!(
                    "{}_{tag}.{ext}",
                    stem_of(input),
                    ext = target.extension
                ));

                let mut args = self.ffmpeg_prefix(input);
                args.extend(["-map".to_string(), format!("0:{}", audio.index)]);
                args.extend(["-c:a".to_string(), target.codec.clone()]);
                args.extend(self.ffmpeg_suffix(&output));

                jobs.push(
                    JobSpec::new(
                        format!("{} audio {tag}", file_name(input)),
                        JobCommand::new(&self.tools.ffmpeg, args),
                    )
                    .with_progress(progress.clone())
                    .with_group(group.clone())
                    .with_output_path(output),
                );
                planned_any = true;
            }

            if !planned_any {
                return Err(PlanError::NoStreams {
                    path: input.clone(),
                });
            }
        }
        Ok(jobs)
    }

    fn ffmpeg_prefix(&self, input: &Path) -> Vec<String> {
        vec![
            if self.overwrite { "-y" } else { "-n" }.to_string(),
            "-i".to_string(),
            input.to_string_lossy().into_owned(),
        ]
    }

    fn ffmpeg_suffix(&self, output: &Path) -> Vec<String> {
        vec![
            "-loglevel".to_string(),
            "warning".to_string(),
            "-progress".to_string(),
            "pipe:2".to_string(),
            output.to_string_lossy().into_owned(),
        ]
    }

    fn unique_output(&self, file_name: &str) -> PathBuf {
        let path = self.out_dir.join(file_name);
        if self.overwrite {
            path
        } else {
            ensure_unique_path(&path)
        }
    }
}

/// Appends ` (1)`, ` (2)`, ... before the extension until the path does
/// not exist.
pub fn ensure_unique_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path.extension().map(|e| e.to_string_lossy().into_owned());
    let parent = path.parent().unwrap_or_else(|| Path::new(""));

    for n in 1.. {
        let name = match &ext {
            Some(ext) => format!("{stem} ({n}).{ext}"),
            None => format!("{stem} ({n})"),
        };
        let candidate = parent.join(name);
        if !candidate.exists() {
            return candidate;
        }
    }
    unreachable!()
}

struct AudioTarget {
    codec: String,
    extension: &'static str,
}

impl AudioTarget {
    fn resolve(format: &str, source_codec: &str, force_reencode: bool) -> Self {
        let (copy_codec, encoder, extension) = match format {
            "aac" | "m4a" => ("aac", "aac", "m4a"),
            "mp3" => ("mp3", "libmp3lame", "mp3"),
            "flac" => ("flac", "flac", "flac"),
            "opus" => ("opus", "libopus", "opus"),
            "wav" => ("pcm", "pcm_s16le", "wav"),
            // Unknown target: trust ffmpeg to know the encoder name.
            other => {
                return Self {
                    codec: other.to_string(),
                    extension: "mka",
                }
            }
        };

        let matches_source = if copy_codec == "pcm" {
            source_codec.starts_with("pcm")
        } else {
            source_codec == copy_codec
        };

        Self {
            codec: if matches_source && !force_reencode {
                "copy".to_string()
            } else {
                encoder.to_string()
            },
            extension,
        }
    }
}

fn video_codec_args(source_codec: &str, container: &str, force_reencode: bool) -> Vec<String> {
    let copyable = matches!(source_codec, "h264" | "hevc")
        && matches!(container, "mp4" | "mkv" | "mov");
    if copyable && !force_reencode {
        vec!["-c".to_string(), "copy".to_string()]
    } else {
        vec!["-c:v".to_string(), "libx264".to_string()]
    }
}

fn audio_tag(stream: &StreamInfo) -> String {
    stream
        .language
        .clone()
        .unwrap_or_else(|| format!("a{}", stream.index))
}

fn stem_of(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediamux_core::{testing::MockProber, MediaInfo, StreamKind};

    fn tools() -> ToolsConfig {
        ToolsConfig::default()
    }

    fn stream(index: u32, kind: StreamKind, codec: &str, language: Option<&str>) -> StreamInfo {
        StreamInfo {
            index,
            kind,
            codec: codec.to_string(),
            language: language.map(String::from),
            title: None,
            default: index == 0,
        }
    }

    async fn cache_with(info: MediaInfo) -> ProbeCache<MockProber> {
        let prober = MockProber::new();
        prober.set_info(info).await;
        ProbeCache::new(prober)
    }

    #[tokio::test]
    async fn test_fetch_plan_builds_ytdlp_invocations() {
        let tools = tools();
        let cache = ProbeCache::new(MockProber::new());
        let planner = Planner {
            tools: &tools,
            cache: &cache,
            out_dir: Path::new("/downloads"),
            overwrite: false,
        };

        let jobs = planner.plan_fetch(
            &["https://example.com/a".to_string(), "https://example.com/b".to_string()],
            "best",
            Some("mp4"),
        );

        assert_eq!(jobs.len(), 2);
        let args = &jobs[0].command.args;
        assert_eq!(jobs[0].command.program, PathBuf::from("yt-dlp"));
        assert_eq!(args[0..2], ["-f".to_string(), "best".to_string()]);
        assert!(args.contains(&"--newline".to_string()));
        assert!(args.contains(&"--merge-output-format".to_string()));
        assert_eq!(args.last().unwrap(), "https://example.com/a");
        assert_eq!(jobs[0].progress, ProgressSource::PercentMarkers);
        assert_eq!(jobs[0].output_path, None);
        // Each URL is its own group.
        assert_ne!(jobs[0].group_id, jobs[1].group_id);
    }

    #[tokio::test]
    async fn test_remux_plan_copies_all_streams() {
        let tools = tools();
        let cache = cache_with(MediaInfo {
            path: PathBuf::from("/media/show.mkv"),
            duration_secs: 120.0,
            streams: vec![stream(0, StreamKind::Video, "h264", None)],
        })
        .await;
        let planner = Planner {
            tools: &tools,
            cache: &cache,
            out_dir: Path::new("/out"),
            overwrite: true,
        };

        let jobs = planner
            .plan_remux(&[PathBuf::from("/media/show.mkv")], "mp4")
            .await
            .unwrap();

        assert_eq!(jobs.len(), 1);
        let job = &jobs[0];
        assert_eq!(job.command.program, PathBuf::from("ffmpeg"));
        let args = &job.command.args;
        assert_eq!(args[0], "-y");
        assert!(args.windows(2).any(|w| w == ["-map", "0"]));
        assert!(args.windows(2).any(|w| w == ["-c", "copy"]));
        assert_eq!(job.output_path, Some(PathBuf::from("/out/show.mp4")));
        assert_eq!(
            job.progress,
            ProgressSource::MediaTime {
                duration_secs: 120.0
            }
        );
    }

    #[tokio::test]
    async fn test_demux_plan_splits_video_and_audio_into_one_group() {
        let tools = tools();
        let cache = cache_with(MediaInfo {
            path: PathBuf::from("/media/film.mkv"),
            duration_secs: 5400.0,
            streams: vec![
                stream(0, StreamKind::Video, "h264", None),
                stream(1, StreamKind::Audio, "aac", Some("eng")),
                stream(2, StreamKind::Audio, "ac3", Some("jpn")),
            ],
        })
        .await;
        let planner = Planner {
            tools: &tools,
            cache: &cache,
            out_dir: Path::new("/out"),
            overwrite: true,
        };

        let jobs = planner
            .plan_demux(&[PathBuf::from("/media/film.mkv")], "aac", "mp4", false)
            .await
            .unwrap();

        assert_eq!(jobs.len(), 3);
        // All jobs of one input share a group.
        assert!(jobs.iter().all(|j| j.group_id == jobs[0].group_id));

        let video = &jobs[0];
        assert!(video.command.args.windows(2).any(|w| w == ["-map", "0:0"]));
        assert!(video.command.args.windows(2).any(|w| w == ["-c", "copy"]));

        // Matching codec is copied, mismatching one re-encoded.
        let eng = &jobs[1];
        assert_eq!(eng.output_path, Some(PathBuf::from("/out/film_eng.m4a")));
        assert!(eng.command.args.windows(2).any(|w| w == ["-c:a", "copy"]));

        let jpn = &jobs[2];
        assert_eq!(jpn.output_path, Some(PathBuf::from("/out/film_jpn.m4a")));
        assert!(jpn.command.args.windows(2).any(|w| w == ["-c:a", "aac"]));
    }

    #[tokio::test]
    async fn test_demux_force_reencode_never_copies() {
        let tools = tools();
        let cache = cache_with(MediaInfo {
            path: PathBuf::from("/media/film.mkv"),
            duration_secs: 100.0,
            streams: vec![
                stream(0, StreamKind::Video, "h264", None),
                stream(1, StreamKind::Audio, "aac", Some("eng")),
            ],
        })
        .await;
        let planner = Planner {
            tools: &tools,
            cache: &cache,
            out_dir: Path::new("/out"),
            overwrite: true,
        };

        let jobs = planner
            .plan_demux(&[PathBuf::from("/media/film.mkv")], "aac", "mp4", true)
            .await
            .unwrap();

        assert!(jobs[0]
            .command
            .args
            .windows(2)
            .any(|w| w == ["-c:v", "libx264"]));
        assert!(jobs[1].command.args.windows(2).any(|w| w == ["-c:a", "aac"]));
    }

    #[tokio::test]
    async fn test_demux_audio_only_input() {
        let tools = tools();
        let cache = cache_with(MediaInfo {
            path: PathBuf::from("/media/session.flac"),
            duration_secs: 300.0,
            streams: vec![stream(0, StreamKind::Audio, "flac", None)],
        })
        .await;
        let planner = Planner {
            tools: &tools,
            cache: &cache,
            out_dir: Path::new("/out"),
            overwrite: true,
        };

        let jobs = planner
            .plan_demux(&[PathBuf::from("/media/session.flac")], "flac", "mp4", false)
            .await
            .unwrap();

        assert_eq!(jobs.len(), 1);
        // No language tag: fall back to the stream index.
        assert_eq!(
            jobs[0].output_path,
            Some(PathBuf::from("/out/session_a0.flac"))
        );
        assert!(jobs[0].command.args.windows(2).any(|w| w == ["-c:a", "copy"]));
    }

    #[tokio::test]
    async fn test_demux_rejects_streamless_input() {
        let tools = tools();
        let cache = cache_with(MediaInfo {
            path: PathBuf::from("/media/empty.bin"),
            duration_secs: 0.0,
            streams: vec![],
        })
        .await;
        let planner = Planner {
            tools: &tools,
            cache: &cache,
            out_dir: Path::new("/out"),
            overwrite: true,
        };

        let result = planner
            .plan_demux(&[PathBuf::from("/media/empty.bin")], "aac", "mp4", false)
            .await;
        assert!(matches!(result, Err(PlanError::NoStreams { .. })));
    }

    #[test]
    fn test_ensure_unique_path_appends_counter() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("clip.mp4");

        assert_eq!(ensure_unique_path(&base), base);

        std::fs::write(&base, b"x").unwrap();
        let second = ensure_unique_path(&base);
        assert_eq!(second, dir.path().join("clip (1).mp4"));

        std::fs::write(&second, b"x").unwrap();
        assert_eq!(ensure_unique_path(&base), dir.path().join("clip (2).mp4"));
    }
}
