//! GStreamer H.264/MP4 sink.
//!
//! # Pipeline
//!
//! ```text
//! appsrc (ARGB, framerate = 1000 / frame_delay)
//!   → videoconvert
//!   → x264enc <preset for Compression>
//!   → h264parse
//!   → mp4mux
//!   → filesink location=<output_path>
//! ```

use bitreel_core::{Compression, EncoderConfig, EncoderError, Frame};
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app::AppSrc;
use tracing::{debug, info, warn};

/// Seconds between forced keyframes.
const KEYFRAME_INTERVAL_S: u32 = 5;
/// How long `on_stop` waits for mp4mux to write its trailer.
const EOS_TIMEOUT_S: u64 = 10;

/// Caps framerate as an exact fraction, so it agrees with buffer timestamps.
fn caps_framerate(frame_delay_ms: u32) -> String {
    format!("1000/{frame_delay_ms}")
}

/// Frames between forced keyframes, never below 1.
fn key_int_max(frame_delay_ms: u32) -> u32 {
    (KEYFRAME_INTERVAL_S * 1000).div_ceil(frame_delay_ms.max(1)).max(1)
}

fn x264_props(compression: Compression) -> &'static str {
    match compression {
        Compression::Low => "speed-preset=ultrafast bitrate=4000",
        Compression::Mid => "speed-preset=medium bitrate=2000",
        Compression::High => "speed-preset=slow bitrate=1000",
    }
}

/// Encodes frames to an MP4 file through a GStreamer pipeline.
#[derive(Default)]
pub struct GstMp4Sink {
    pipeline: Option<gst::Pipeline>,
    appsrc: Option<AppSrc>,
    frame_delay_ms: u64,
}

impl GstMp4Sink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Surface an asynchronous pipeline error (e.g. unwritable output).
    fn check_bus(&self) -> Result<(), EncoderError> {
        let Some(bus) = self.pipeline.as_ref().and_then(|p| p.bus()) else {
            return Ok(());
        };
        if let Some(msg) = bus.pop_filtered(&[gst::MessageType::Error]) {
            if let gst::MessageView::Error(e) = msg.view() {
                return Err(EncoderError::Pipeline(e.error().to_string()));
            }
        }
        Ok(())
    }

    fn teardown(&mut self) {
        self.appsrc = None;
        if let Some(pipeline) = self.pipeline.take() {
            let _ = pipeline.set_state(gst::State::Null);
        }
    }
}

impl crate::FrameSink for GstMp4Sink {
    fn on_start(&mut self, config: &EncoderConfig) -> Result<(), EncoderError> {
        gst::init().map_err(|e| EncoderError::Pipeline(e.to_string()))?;

        let width = config.resolution.width;
        let height = config.resolution.height;
        let framerate = caps_framerate(config.frame_delay_ms);
        let key_int = key_int_max(config.frame_delay_ms);
        let props = x264_props(config.compression);

        let desc = format!(
            "appsrc name=src is-live=false format=time \
                 caps=\"video/x-raw,format=ARGB,width={width},height={height},framerate={framerate}\" \
             ! videoconvert \
             ! x264enc {props} key-int-max={key_int} \
             ! h264parse \
             ! mp4mux \
             ! filesink name=out"
        );
        debug!("Encoder pipeline: {}", desc);

        let pipeline = gst::parse::launch(&desc)
            .map_err(|e| EncoderError::Pipeline(e.to_string()))?
            .downcast::<gst::Pipeline>()
            .map_err(|_| EncoderError::Pipeline("Expected a Pipeline".into()))?;

        let appsrc = pipeline
            .by_name("src")
            .and_then(|element| element.downcast::<AppSrc>().ok())
            .ok_or_else(|| EncoderError::Pipeline("No appsrc".into()))?;

        let filesink = pipeline
            .by_name("out")
            .ok_or_else(|| EncoderError::Pipeline("No filesink".into()))?;
        filesink.set_property("location", config.output_path.to_string_lossy().into_owned());

        pipeline
            .set_state(gst::State::Playing)
            .map_err(|_| EncoderError::Pipeline("Failed to start pipeline".into()))?;

        info!("GstMp4Sink ready {} @ {} fps ({})", config.resolution, fps, config.compression);
        self.frame_delay_ms = config.frame_delay_ms as u64;
        self.pipeline = Some(pipeline);
        self.appsrc = Some(appsrc);
        Ok(())
    }

    fn on_frame(&mut self, frame: &Frame, pts_ms: u64) -> Result<(), EncoderError> {
        self.check_bus()?;
        let appsrc = self
            .appsrc
            .as_ref()
            .ok_or_else(|| EncoderError::InvalidState { reason: "GStreamer sink not started".into() })?;

        let mut buf = gst::Buffer::with_size(frame.data().len())
            .map_err(|_| EncoderError::Pipeline("Allocating GStreamer buffer".into()))?;
        {
            let buf_mut = buf
                .get_mut()
                .ok_or_else(|| EncoderError::Pipeline("Buffer not writable".into()))?;
            buf_mut.set_pts(gst::ClockTime::from_mseconds(pts_ms));
            buf_mut.set_duration(gst::ClockTime::from_mseconds(self.frame_delay_ms));
            let mut map = buf_mut
                .map_writable()
                .map_err(|_| EncoderError::Pipeline("Failed to map buffer".into()))?;
            map.copy_from_slice(frame.data());
        }

        appsrc
            .push_buffer(buf)
            .map_err(|e| EncoderError::Pipeline(format!("appsrc push_buffer: {e:?}")))?;
        Ok(())
    }

    fn on_stop(&mut self, frames: u64) -> Result<(), EncoderError> {
        let (Some(pipeline), Some(appsrc)) = (self.pipeline.as_ref(), self.appsrc.as_ref()) else {
            return Ok(());
        };
        let _ = appsrc.end_of_stream();

        let outcome = match pipeline.bus() {
            Some(bus) => match bus.timed_pop_filtered(
                gst::ClockTime::from_seconds(EOS_TIMEOUT_S),
                &[gst::MessageType::Eos, gst::MessageType::Error],
            ) {
                Some(msg) => match msg.view() {
                    gst::MessageView::Error(e) => Err(EncoderError::Pipeline(e.error().to_string())),
                    _ => Ok(()),
                },
                None => {
                    warn!("GstMp4Sink: no EOS after {}s, output may be truncated", EOS_TIMEOUT_S);
                    Ok(())
                }
            },
            None => Ok(()),
        };

        self.teardown();
        info!("GstMp4Sink closed after {} frames", frames);
        outcome
    }
}

impl Drop for GstMp4Sink {
    fn drop(&mut self) {
        self.teardown();
    }
}
