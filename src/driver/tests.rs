use super::*;
use crate::capture_file::Recording;
use crate::chunk::ChunkOp;
use crate::error::{ReplayError, SerialError};
use crate::fake_gl::{FakeDraw, FakeGl};
use crate::hooks::{
    GlHooks, CLIENT_MAPPED_BUFFER_BARRIER_BIT, DYNAMIC_STORAGE_BIT, MAP_COHERENT_BIT,
    MAP_PERSISTENT_BIT,
};
use crate::initstate::{decode_level, InitialContents, InitialState};
use crate::mapping::UNINITIALISED_FILL;
use crate::replay::{GlReplay, ReplayMode};

use gleam::gl::{self, GLint};

fn ctx() -> GlContext {
    GlContext::new(1, 1)
}

fn capture() -> GlCapture<FakeGl> {
    GlCapture::new(FakeGl::new(), ctx(), CaptureOptions::default())
}

fn ops(chunks: &[Chunk]) -> Vec<ChunkOp> {
    chunks.iter().map(Chunk::op).collect()
}

/// The initial contents `frame` captured for `id`.
fn initial_contents(frame: &CapturedFrame, id: ResourceId) -> InitialContents {
    frame
        .initial
        .iter()
        .map(|chunk| chunk.read::<InitialState>().unwrap())
        .find(|state| state.id == id)
        .unwrap()
        .contents
}

/// Replay frame `index` of what `capture` recorded, after a trip through the
/// capture file format.
fn replay(capture: &GlCapture<FakeGl>, index: usize) -> GlReplay<FakeGl> {
    let recording = Recording::read(&capture.recording().to_bytes()).unwrap();
    GlReplay::new(FakeGl::new(), ctx(), &recording, index).unwrap()
}

#[test]
fn frame_creating_objects() {
    let mut capture = capture();
    let sampler = capture.create_sampler();
    capture.sampler_parameter_i(sampler, gl::TEXTURE_MIN_FILTER, gl::NEAREST as GLint);
    capture.sampler_parameter_f(sampler, gl::TEXTURE_MAX_LOD, 4.0);
    capture.bind_sampler(0, sampler);
    let sampler_id = capture.resource_id(ResourceKind::Sampler, sampler).unwrap();

    capture.begin_frame_capture();
    assert_eq!(capture.state(), CaptureState::CapturingFrame);
    let buffer = capture.gen_buffer();
    let contents: Vec<u8> = (0..1024).map(|i| (i % 251) as u8).collect();
    capture.buffer_data(buffer, 1024, Some(&contents[..]), gl::STATIC_DRAW);
    capture.create_texture(gl::TEXTURE_2D);
    capture.draw_arrays(gl::TRIANGLES, 0, 3);
    let frame = capture.end_frame_capture().unwrap().clone();
    assert_eq!(capture.state(), CaptureState::Idle);

    assert_eq!(
        ops(&frame.chunks),
        vec![ChunkOp::CreateBuffer, ChunkOp::BufferData, ChunkOp::CreateTexture, ChunkOp::DrawArrays]
    );
    assert_eq!(
        ops(&frame.setup),
        vec![ChunkOp::CreateSampler, ChunkOp::SamplerParameterI, ChunkOp::SamplerParameterF]
    );
    assert_eq!(frame.initial.len(), 1);
    let state: InitialState = frame.initial[0].read().unwrap();
    assert_eq!(state.id, sampler_id);

    let mut replay = replay(&capture, 0);
    assert_eq!(replay.state(), CaptureState::Reading);
    assert_eq!(replay.events().len(), 4);
    replay.replay_log(1, 4, ReplayMode::Full).unwrap();
    assert_eq!(replay.state(), CaptureState::Executing);

    let buffer_id = capture.resource_id(ResourceKind::Buffer, buffer).unwrap();
    let replayed = replay.live_name(buffer_id).unwrap();
    assert_eq!(replay.gl().buffer_contents(replayed), contents);

    let replayed = replay.live_name(sampler_id).unwrap();
    assert_eq!(
        replay.gl().get_sampler_parameter_i(replayed, gl::TEXTURE_MIN_FILTER),
        gl::NEAREST as GLint
    );
    assert_eq!(replay.gl().get_sampler_parameter_f(replayed, gl::TEXTURE_MAX_LOD), 4.0);
    assert_eq!(
        replay.gl().draws(),
        vec![FakeDraw::Arrays { mode: gl::TRIANGLES, first: 0, count: 3 }]
    );
}

#[test]
fn captured_unmap_records_only_changes() {
    let mut capture = capture();
    let buffer = capture.gen_buffer();
    capture.buffer_data(buffer, 4096, None, gl::DYNAMIC_DRAW);
    let id = capture.resource_id(ResourceKind::Buffer, buffer).unwrap();

    capture.begin_frame_capture();
    let pointer = capture.map_buffer_range(buffer, 0, 4096, gl::MAP_WRITE_BIT);
    assert!(!pointer.is_null());
    let mapped = capture.mapped_range_mut(buffer).unwrap();
    assert_eq!(mapped.len(), 4096);
    for byte in &mut mapped[100..116] {
        *byte = 0xab;
    }
    assert!(capture.unmap_buffer(buffer));
    let frame = capture.end_frame_capture().unwrap().clone();

    assert_eq!(ops(&frame.chunks), vec![ChunkOp::Unmap]);
    let unmap: params::Unmap = frame.chunks[0].read().unwrap();
    assert_eq!(unmap.buffer, id);
    assert_eq!(unmap.offset, 100);
    assert_eq!(unmap.data, vec![0xab; 16]);
    assert!(capture.map_emulator().bytes_saved() >= 4096 - 16);

    // The write reached the driver, and the buffer is now dirty.
    let written = capture.gl().buffer_contents(buffer);
    assert_eq!(&written[100..116], &[0xab; 16][..]);
    assert!(capture.manager().is_dirty(id));

    let mut replay = replay(&capture, 0);
    replay.replay_log(1, 1, ReplayMode::Full).unwrap();
    let replayed = replay.live_name(id).unwrap();
    assert_eq!(replay.gl().buffer_contents(replayed), written);
}

#[test]
fn aborted_capture_leaves_no_trace() {
    let mut capture = capture();
    let buffer = capture.gen_buffer();
    capture.buffer_data(buffer, 16, Some(&[1; 16][..]), gl::STATIC_DRAW);
    let id = capture.resource_id(ResourceKind::Buffer, buffer).unwrap();

    capture.begin_frame_capture();
    capture.buffer_sub_data(buffer, 0, &[2; 4]);
    capture.abort_frame_capture();

    assert!(!capture.is_capturing());
    assert!(!capture.manager().is_dirty(id));
    assert!(capture.captures().is_empty());
    assert_eq!(capture.end_frame_capture().err(), Some(CaptureFailure::NotCapturing));
}

#[test]
fn ids_survive_name_reuse() {
    let mut capture = capture();
    let first = capture.gen_buffer();
    let first_id = capture.resource_id(ResourceKind::Buffer, first).unwrap();
    capture.delete_object(ResourceKind::Buffer, first);
    assert_eq!(capture.resource_id(ResourceKind::Buffer, first), None);

    let second = capture.gen_buffer();
    assert_eq!(second, first);
    let second_id = capture.resource_id(ResourceKind::Buffer, second).unwrap();
    assert_ne!(second_id, first_id);
    assert!(second_id > first_id);
}

#[test]
fn idle_respecification_drops_superseded_calls() {
    let mut capture = capture();
    let sampler = capture.create_sampler();
    capture.sampler_parameter_i(sampler, gl::TEXTURE_MIN_FILTER, gl::NEAREST as GLint);
    capture.sampler_parameter_i(sampler, gl::TEXTURE_MIN_FILTER, gl::LINEAR as GLint);
    capture.sampler_parameter_i(sampler, gl::TEXTURE_MAG_FILTER, gl::LINEAR as GLint);
    let id = capture.resource_id(ResourceKind::Sampler, sampler).unwrap();
    assert_eq!(capture.manager().record(id).unwrap().chunk_count(), 3);
}

#[test]
fn unchanged_state_snapshots_converge() {
    let mut capture = capture();
    let sampler = capture.create_sampler();
    capture.sampler_parameter_i(sampler, gl::TEXTURE_WRAP_S, gl::REPEAT as GLint);
    capture.bind_sampler(3, sampler);

    for _ in 0..2 {
        capture.begin_frame_capture();
        capture.draw_arrays(gl::POINTS, 0, 1);
        capture.end_frame_capture().unwrap();
    }
    let captures = capture.captures();
    assert_eq!(captures.len(), 2);
    assert_eq!(captures[0].initial, captures[1].initial);
    assert_eq!(captures[0].setup, captures[1].setup);
}

#[test]
fn flush_outside_map_is_clamped() {
    let mut capture = capture();
    let buffer = capture.gen_buffer();
    capture.buffer_data(buffer, 64, None, gl::DYNAMIC_DRAW);
    let id = capture.resource_id(ResourceKind::Buffer, buffer).unwrap();

    capture.begin_frame_capture();
    let access = gl::MAP_WRITE_BIT | gl::MAP_FLUSH_EXPLICIT_BIT;
    assert!(!capture.map_buffer_range(buffer, 16, 32, access).is_null());
    for byte in capture.mapped_range_mut(buffer).unwrap().iter_mut() {
        *byte = 7;
    }
    capture.flush_mapped_buffer_range(buffer, 8, 100);
    capture.unmap_buffer(buffer);
    let frame = capture.end_frame_capture().unwrap().clone();

    assert_eq!(ops(&frame.chunks), vec![ChunkOp::FlushMap]);
    let flush: params::FlushMap = frame.chunks[0].read().unwrap();
    assert_eq!(flush.offset, 24);
    assert_eq!(flush.data, vec![7; 24]);
    assert!(frame.warnings.contains(&CaptureWarning::FlushClamped { id, offset: 8, length: 100 }));
}

#[test]
fn coherent_writes_reach_the_driver_before_draws() {
    let mut capture = capture();
    let buffer = capture.gen_buffer();
    let flags = gl::MAP_WRITE_BIT | MAP_PERSISTENT_BIT | MAP_COHERENT_BIT;
    capture.buffer_storage(buffer, 64, None, flags);

    capture.begin_frame_capture();
    assert!(!capture.map_buffer_range(buffer, 0, 64, flags).is_null());
    capture.mapped_range_mut(buffer).unwrap()[4..8].copy_from_slice(&[1, 2, 3, 4]);
    capture.draw_arrays(gl::TRIANGLES, 0, 3);

    assert_eq!(&capture.gl().buffer_contents(buffer)[4..8], &[1, 2, 3, 4]);
    assert!(capture.gl().flushes().contains(&(buffer, 4, 4)));

    let frame = capture.end_frame_capture().unwrap().clone();
    assert_eq!(ops(&frame.chunks), vec![ChunkOp::FlushMap, ChunkOp::DrawArrays]);
    let flush: params::FlushMap = frame.chunks[0].read().unwrap();
    assert_eq!((flush.offset, flush.data), (4, vec![1, 2, 3, 4]));
}

#[test]
fn failed_triggered_capture_is_retried() {
    let mut capture = capture();
    let buffer = capture.gen_buffer();
    capture.buffer_data(buffer, 32, None, gl::DYNAMIC_DRAW);
    // An idle write map that keeps the old contents goes straight to the
    // driver, so its unmap can't be captured.
    assert!(!capture.map_buffer_range(buffer, 0, 32, gl::MAP_WRITE_BIT).is_null());

    capture.trigger_capture();
    capture.swap_buffers();
    assert!(capture.is_capturing());
    assert_eq!(capture.frame_number(), 1);
    capture.unmap_buffer(buffer);

    capture.swap_buffers();
    assert!(capture.captures().is_empty());
    assert!(capture.is_capturing());
    assert_eq!(capture.frame_number(), 2);

    capture.draw_arrays(gl::TRIANGLES, 0, 3);
    capture.swap_buffers();
    assert!(!capture.is_capturing());
    assert_eq!(capture.captures().len(), 1);
    assert_eq!(capture.captures()[0].frame_number, 2);
}

#[test]
fn objects_deleted_during_frame() {
    let mut capture = capture();
    capture.begin_frame_capture();
    let buffer = capture.gen_buffer();
    let id = capture.resource_id(ResourceKind::Buffer, buffer).unwrap();
    capture.delete_object(ResourceKind::Buffer, buffer);
    let frame = capture.end_frame_capture().unwrap().clone();
    assert_eq!(ops(&frame.chunks), vec![ChunkOp::CreateBuffer, ChunkOp::DeleteResource]);
    assert!(capture.manager().record(id).is_none());

    let mut replay = replay(&capture, 0);
    replay.replay_log(1, 1, ReplayMode::Full).unwrap();
    assert!(replay.live_name(id).is_ok());
    replay.replay_log(1, 2, ReplayMode::Full).unwrap();
    assert!(replay.live_name(id).is_err());
    assert!(replay.gl().live_objects(ResourceKind::Buffer).is_empty());
}

/// Capture a frame that clears a texture-backed framebuffer and draws into
/// it: a clear color, a clear, a draw, a three-draw `MultiDrawArrays`, and
/// another draw.
fn drawing_capture() -> (GlCapture<FakeGl>, GLuint) {
    let mut capture = capture();
    let texture = capture.create_texture(gl::TEXTURE_2D);
    capture.tex_image_2d(texture, gl::TEXTURE_2D, 0, gl::RGBA8 as GLint, 4, 4,
                         gl::RGBA, gl::UNSIGNED_BYTE, None);
    let framebuffer = capture.create_framebuffer();
    capture.framebuffer_texture(framebuffer, gl::COLOR_ATTACHMENT0, texture, 0);
    capture.bind_framebuffer(gl::FRAMEBUFFER, framebuffer);

    capture.begin_frame_capture();
    capture.clear_color(1.0, 0.0, 0.0, 1.0);
    capture.clear(gl::COLOR_BUFFER_BIT);
    capture.draw_arrays(gl::TRIANGLES, 0, 3);
    capture.multi_draw_arrays(gl::TRIANGLES, &[0, 3, 6], &[3, 3, 3]);
    capture.draw_arrays(gl::TRIANGLES, 9, 3);
    capture.end_frame_capture().unwrap();
    (capture, texture)
}

fn arrays(first: GLint, count: GLint) -> FakeDraw {
    FakeDraw::Arrays { mode: gl::TRIANGLES, first, count }
}

#[test]
fn event_and_drawcall_lists() {
    let (capture, _) = drawing_capture();
    let replay = replay(&capture, 0);

    let events = replay.events();
    assert_eq!(events.len(), 7);
    assert_eq!(events[0].op, ChunkOp::ClearColor);
    assert_eq!(events[3].sub_draw, Some(0));
    assert_eq!(events[5].sub_draw, Some(2));
    assert_eq!(events[5].chunk_index, 3);
    assert_eq!(events[6].chunk_index, 4);

    let ids: Vec<u32> = replay.drawcalls().iter().map(|drawcall| drawcall.event_id).collect();
    assert_eq!(ids, vec![2, 3, 4, 5, 6, 7]);
    assert_eq!(replay.get_event(1).map(|event| event.op), Some(ChunkOp::ClearColor));
    assert!(replay.get_event(0).is_none());
    assert!(replay.get_event(8).is_none());
    assert!(replay.get_drawcall(1).is_none());
    assert_eq!(replay.get_drawcall(5).map(|drawcall| drawcall.count), Some(3));
}

#[test]
fn replay_modes() {
    let (capture, texture) = drawing_capture();
    let texture_id = capture.resource_id(ResourceKind::Texture, texture).unwrap();
    let mut replay = replay(&capture, 0);

    replay.replay_log(1, 5, ReplayMode::Full).unwrap();
    assert_eq!(
        replay.gl().draws(),
        vec![FakeDraw::Clear(gl::COLOR_BUFFER_BIT), arrays(0, 3), arrays(0, 3), arrays(3, 3)]
    );
    assert_eq!(replay.replayed_to(), Some(5));
    let replayed = replay.live_name(texture_id).unwrap();
    let pixels = replay.gl().texture_pixels(replayed, gl::TEXTURE_2D, 0);
    assert_eq!(pixels.len(), 64);
    assert!(pixels.chunks(4).all(|pixel| pixel == [255, 0, 0, 255]));

    replay.gl().clear_draws();
    replay.replay_log(6, 7, ReplayMode::StopAfterLast).unwrap();
    assert_eq!(replay.gl().draws(), vec![arrays(6, 3), arrays(9, 3)]);

    replay.gl().clear_draws();
    replay.replay_log(7, 7, ReplayMode::DiscardBeforeFirst).unwrap();
    assert_eq!(replay.gl().draws(), vec![arrays(9, 3)]);
    assert_eq!(replay.replayed_to(), Some(7));

    assert!(matches!(replay.replay_log(1, 8, ReplayMode::Full), Err(ReplayError::EventOutOfRange(8))));
    assert!(matches!(
        replay.replay_log(5, 3, ReplayMode::StopAfterLast),
        Err(ReplayError::EventOutOfRange(5))
    ));
}

#[test]
fn missing_frame() {
    let (capture, _) = drawing_capture();
    let recording = capture.recording();
    assert!(matches!(
        GlReplay::new(FakeGl::new(), ctx(), &recording, 3),
        Err(ReplayError::NoFrame(3))
    ));
}

#[test]
fn invalidating_map_records_whole_range() {
    let mut capture = capture();
    let buffer = capture.gen_buffer();
    capture.buffer_data(buffer, 1024, Some(&[1; 1024][..]), gl::DYNAMIC_DRAW);
    let id = capture.resource_id(ResourceKind::Buffer, buffer).unwrap();

    capture.begin_frame_capture();
    let access = gl::MAP_WRITE_BIT | gl::MAP_INVALIDATE_BUFFER_BIT;
    assert!(!capture.map_buffer_range(buffer, 0, 1024, access).is_null());
    let mapped = capture.mapped_range_mut(buffer).unwrap();
    assert!(mapped.iter().all(|&byte| byte == UNINITIALISED_FILL));
    mapped[..4].copy_from_slice(&[7; 4]);
    assert!(capture.unmap_buffer(buffer));
    let frame = capture.end_frame_capture().unwrap().clone();

    assert_eq!(ops(&frame.chunks), vec![ChunkOp::Unmap]);
    let unmap: params::Unmap = frame.chunks[0].read().unwrap();
    assert_eq!(unmap.buffer, id);
    assert_eq!(unmap.offset, 0);
    assert_eq!(unmap.data.len(), 1024);
    assert_eq!(&unmap.data[..4], &[7; 4]);
    assert!(unmap.data[4..].iter().all(|&byte| byte == UNINITIALISED_FILL));
    assert_eq!(capture.map_emulator().bytes_saved(), 0);
    assert_eq!(capture.gl().buffer_contents(buffer), unmap.data);
}

#[test]
fn busy_objects_become_high_traffic() {
    assert_eq!(ResourceKind::Buffer.high_traffic_threshold(), 60);
    assert_eq!(ResourceKind::Texture.high_traffic_threshold(), 20);
    assert_eq!(ResourceKind::Sampler.high_traffic_threshold(), 32);
    assert_eq!(ResourceKind::VertexArray.high_traffic_threshold(), 32);

    let mut capture = capture();
    let buffer = capture.gen_buffer();
    capture.buffer_data(buffer, 4, None, gl::DYNAMIC_DRAW);
    let buffer_id = capture.resource_id(ResourceKind::Buffer, buffer).unwrap();
    for i in 0..60 {
        capture.buffer_sub_data(buffer, 0, &[i; 4]);
    }
    assert!(capture.manager().tracks_history(buffer_id));
    assert_eq!(capture.manager().record(buffer_id).unwrap().chunk_count(), 62);
    capture.buffer_sub_data(buffer, 0, &[99; 4]);
    assert!(capture.manager().is_high_traffic(buffer_id));
    assert!(capture.manager().is_dirty(buffer_id));
    assert_eq!(capture.manager().record(buffer_id).unwrap().chunk_count(), 62);

    let texture = capture.create_texture(gl::TEXTURE_2D);
    capture.tex_image_2d(texture, gl::TEXTURE_2D, 0, gl::RGBA8 as GLint, 1, 1,
                         gl::RGBA, gl::UNSIGNED_BYTE, None);
    let texture_id = capture.resource_id(ResourceKind::Texture, texture).unwrap();
    for i in 0..20 {
        capture.tex_sub_image_2d(texture, gl::TEXTURE_2D, 0, 0, 0, 1, 1,
                                 gl::RGBA, gl::UNSIGNED_BYTE, &[i; 4]);
    }
    assert!(!capture.manager().is_high_traffic(texture_id));
    capture.tex_sub_image_2d(texture, gl::TEXTURE_2D, 0, 0, 0, 1, 1,
                             gl::RGBA, gl::UNSIGNED_BYTE, &[99; 4]);
    assert!(capture.manager().is_high_traffic(texture_id));
    assert!(!capture.manager().tracks_history(texture_id));

    // High-traffic buffers keep their snapshots out of the record.
    capture.begin_frame_capture();
    capture.buffer_sub_data(buffer, 0, &[1; 4]);
    let frame = capture.end_frame_capture().unwrap().clone();
    assert_eq!(initial_contents(&frame, buffer_id), InitialContents::Buffer { data: vec![99; 4] });
    assert_eq!(capture.manager().record(buffer_id).unwrap().chunk_count(), 62);
}

#[test]
fn read_map_uses_backing_store() {
    let mut capture = capture();
    let buffer = capture.gen_buffer();
    capture.buffer_data(buffer, 32, Some(&[1; 32][..]), gl::DYNAMIC_DRAW);
    let id = capture.resource_id(ResourceKind::Buffer, buffer).unwrap();
    // A write the capture layer never saw, as a shader might make.
    capture.gl().buffer_sub_data(buffer, 4, &[3; 4]);

    let pointer = capture.map_buffer_range(buffer, 0, 32, gl::MAP_READ_BIT);
    let backing = capture.manager().record(id).unwrap().buffer().unwrap().backing.as_ptr();
    assert_eq!(pointer as *const u8, backing);
    let expected = capture.gl().buffer_contents(buffer);
    assert_eq!(&capture.mapped_range_mut(buffer).unwrap()[..], &expected[..]);

    assert!(capture.unmap_buffer(buffer));
    assert!(!capture.manager().is_high_traffic(id));
    assert_eq!(capture.manager().record(id).unwrap().chunk_count(), 2);
}

#[test]
fn idle_passthrough_map_dirties_buffer() {
    let mut capture = capture();
    let buffer = capture.gen_buffer();
    capture.buffer_data(buffer, 32, Some(&[1; 32][..]), gl::DYNAMIC_DRAW);
    let id = capture.resource_id(ResourceKind::Buffer, buffer).unwrap();
    assert!(!capture.manager().is_dirty(id));

    let pointer = capture.map_buffer_range(buffer, 0, 32, gl::MAP_WRITE_BIT);
    assert_eq!(pointer, capture.gl().map_buffer_range(buffer, 0, 32, gl::MAP_WRITE_BIT));
    capture.mapped_range_mut(buffer).unwrap()[..4].copy_from_slice(&[5; 4]);
    assert!(capture.unmap_buffer(buffer));
    assert!(capture.manager().is_dirty(id));
    assert_eq!(&capture.gl().buffer_contents(buffer)[..4], &[5; 4]);

    // The next capture snapshots what the application wrote.
    capture.begin_frame_capture();
    capture.buffer_sub_data(buffer, 8, &[7; 4]);
    let frame = capture.end_frame_capture().unwrap().clone();
    let mut expected = vec![1; 32];
    expected[..4].copy_from_slice(&[5; 4]);
    assert_eq!(initial_contents(&frame, id), InitialContents::Buffer { data: expected });
}

#[test]
fn texture_contents_round_trip() {
    let mut capture = capture();
    let rgba = capture.create_texture(gl::TEXTURE_2D);
    capture.tex_image_2d(rgba, gl::TEXTURE_2D, 0, gl::RGBA8 as GLint, 8, 2,
                         gl::RGBA, gl::UNSIGNED_BYTE, None);
    let rgb = capture.create_texture(gl::TEXTURE_2D);
    capture.tex_image_2d(rgb, gl::TEXTURE_2D, 0, gl::RGB8 as GLint, 4, 1,
                         gl::RGB, gl::UNSIGNED_BYTE, None);
    let rgba_id = capture.resource_id(ResourceKind::Texture, rgba).unwrap();
    let rgb_id = capture.resource_id(ResourceKind::Texture, rgb).unwrap();

    // Render to both behind the capture layer's back, so only a snapshot
    // can reproduce them.
    let mut rgba_pixels: Vec<u8> = [10, 20, 30, 40].repeat(12);
    rgba_pixels.extend(1..=16);
    capture.gl().tex_sub_image_2d(rgba, gl::TEXTURE_2D, 0, 0, 0, 8, 2,
                                  gl::RGBA, gl::UNSIGNED_BYTE, &rgba_pixels);
    let rgb_pixels: Vec<u8> = vec![0, 0, 0, 0, 0, 0, 0, 0, 0, 5, 6, 7];
    capture.gl().tex_sub_image_2d(rgb, gl::TEXTURE_2D, 0, 0, 0, 4, 1,
                                  gl::RGB, gl::UNSIGNED_BYTE, &rgb_pixels);

    capture.begin_frame_capture();
    capture.bind_texture_unit(0, rgba);
    capture.bind_texture_unit(1, rgb);
    capture.draw_arrays(gl::TRIANGLES, 0, 3);
    let frame = capture.end_frame_capture().unwrap().clone();

    for (id, pixels, packed_words) in vec![(rgba_id, &rgba_pixels, true), (rgb_id, &rgb_pixels, false)] {
        let contents = match initial_contents(&frame, id) {
            InitialContents::Texture(contents) => contents,
            other => panic!("expected texture contents, got {:?}", other),
        };
        assert_eq!(contents.levels.len(), 1);
        let level = &contents.levels[0];
        assert_eq!(level.packed_words, packed_words);
        assert_eq!(&decode_level(&contents, level).unwrap(), pixels);
        if packed_words {
            assert!(level.rle.len() < pixels.len());
        }
    }

    let mut replay = replay(&capture, 0);
    replay.replay_log(1, 3, ReplayMode::Full).unwrap();
    let replayed = replay.live_name(rgba_id).unwrap();
    assert_eq!(replay.gl().texture_pixels(replayed, gl::TEXTURE_2D, 0), rgba_pixels);
    let replayed = replay.live_name(rgb_id).unwrap();
    assert_eq!(replay.gl().texture_pixels(replayed, gl::TEXTURE_2D, 0), rgb_pixels);
}

#[test]
fn multisample_texture_contents_undefined() {
    let mut capture = capture();
    let texture = capture.create_texture(gl::TEXTURE_2D_MULTISAMPLE);
    let id = capture.resource_id(ResourceKind::Texture, texture).unwrap();

    capture.begin_frame_capture();
    capture.bind_texture_unit(0, texture);
    let frame = capture.end_frame_capture().unwrap().clone();

    assert!(matches!(initial_contents(&frame, id), InitialContents::Undefined { .. }));
    assert!(frame.warnings.iter().any(|warning| matches!(
        warning,
        CaptureWarning::InitialStateUnsupported { id: warned, .. } if *warned == id
    )));
}

#[test]
fn bad_texture_level_size_is_undefined() {
    let mut capture = capture();
    let texture = capture.create_texture(gl::TEXTURE_2D);
    capture.tex_image_2d(texture, gl::TEXTURE_2D, 0, gl::RGBA8 as GLint, 4, -1,
                         gl::RGBA, gl::UNSIGNED_BYTE, None);
    let id = capture.resource_id(ResourceKind::Texture, texture).unwrap();

    capture.begin_frame_capture();
    capture.bind_texture_unit(0, texture);
    let frame = capture.end_frame_capture().unwrap().clone();

    assert!(matches!(initial_contents(&frame, id), InitialContents::Undefined { .. }));
    assert!(frame.warnings.iter().any(|warning| matches!(
        warning,
        CaptureWarning::InitialStateUnsupported { id: warned, .. } if *warned == id
    )));
}

#[test]
fn memory_barrier_propagates_persistent_writes() {
    let mut capture = capture();
    let buffer = capture.gen_buffer();
    let flags = gl::MAP_WRITE_BIT | MAP_PERSISTENT_BIT;
    capture.buffer_storage(buffer, 64, None, flags);
    let id = capture.resource_id(ResourceKind::Buffer, buffer).unwrap();

    capture.begin_frame_capture();
    assert!(!capture.map_buffer_range(buffer, 0, 64, flags).is_null());
    capture.mapped_range_mut(buffer).unwrap()[8..12].copy_from_slice(&[1, 2, 3, 4]);

    // Without coherence, a draw doesn't make the write visible.
    capture.draw_arrays(gl::TRIANGLES, 0, 3);
    assert_eq!(&capture.gl().buffer_contents(buffer)[8..12], &[0; 4]);

    capture.memory_barrier(CLIENT_MAPPED_BUFFER_BARRIER_BIT);
    assert_eq!(&capture.gl().buffer_contents(buffer)[8..12], &[1, 2, 3, 4]);
    assert!(capture.gl().flushes().contains(&(buffer, 8, 4)));
    let frame = capture.end_frame_capture().unwrap().clone();

    assert_eq!(
        ops(&frame.chunks),
        vec![ChunkOp::DrawArrays, ChunkOp::FlushMap, ChunkOp::MemoryBarrier]
    );
    let flush: params::FlushMap = frame.chunks[1].read().unwrap();
    assert_eq!((flush.buffer, flush.offset, flush.data), (id, 8, vec![1, 2, 3, 4]));

    let mut replay = replay(&capture, 0);
    replay.replay_log(1, 3, ReplayMode::Full).unwrap();
    let replayed = replay.live_name(id).unwrap();
    assert_eq!(&replay.gl().buffer_contents(replayed)[8..12], &[1, 2, 3, 4]);
    assert_eq!(replay.gl().invalid_operations(), 0);
}

#[test]
fn explicit_flushes_of_persistent_map() {
    let mut capture = capture();
    let buffer = capture.gen_buffer();
    capture.buffer_storage(buffer, 64, None, gl::MAP_WRITE_BIT | MAP_PERSISTENT_BIT);
    let id = capture.resource_id(ResourceKind::Buffer, buffer).unwrap();

    capture.begin_frame_capture();
    let access = gl::MAP_WRITE_BIT | MAP_PERSISTENT_BIT | gl::MAP_FLUSH_EXPLICIT_BIT;
    assert!(!capture.map_buffer_range(buffer, 16, 32, access).is_null());
    assert!(capture.map_emulator().is_persistently_mapped(id));
    for byte in capture.mapped_range_mut(buffer).unwrap().iter_mut() {
        *byte = 5;
    }
    capture.flush_mapped_buffer_range(buffer, 4, 8);
    assert!(capture.unmap_buffer(buffer));
    assert!(!capture.map_emulator().is_persistently_mapped(id));
    let frame = capture.end_frame_capture().unwrap().clone();

    assert_eq!(ops(&frame.chunks), vec![ChunkOp::FlushMap]);
    let flush: params::FlushMap = frame.chunks[0].read().unwrap();
    assert_eq!((flush.offset, flush.data), (20, vec![5; 8]));

    // Only the flushed range reached the driver.
    let contents = capture.gl().buffer_contents(buffer);
    assert_eq!(&contents[20..28], &[5; 8]);
    assert_eq!(&contents[16..20], &[0; 4]);
    assert_eq!(&contents[28..48], &[0; 20]);
    assert!(capture.gl().flushes().contains(&(buffer, 20, 8)));
}

#[test]
fn snapshot_waits_for_owning_context() {
    let mut capture = capture();
    let other = GlContext::new(2, 1);
    capture.make_current(other);
    let framebuffer = capture.create_framebuffer();
    capture.bind_framebuffer(gl::FRAMEBUFFER, framebuffer);
    let id = capture.resource_id(ResourceKind::Framebuffer, framebuffer).unwrap();
    capture.make_current(ctx());
    assert_eq!(capture.resource_id(ResourceKind::Framebuffer, framebuffer), None);

    capture.begin_frame_capture();
    assert!(capture.manager().serialise_initial_state(id).is_none());
    capture.make_current(other);
    assert!(capture.manager().serialise_initial_state(id).is_some());
    capture.make_current(ctx());
    let frame = capture.end_frame_capture().unwrap().clone();
    assert!(!frame.warnings.contains(&CaptureWarning::InitialStateMissed(id)));
    assert!(matches!(initial_contents(&frame, id), InitialContents::Framebuffer(_)));

    capture.begin_frame_capture();
    let frame = capture.end_frame_capture().unwrap().clone();
    assert!(frame.warnings.contains(&CaptureWarning::InitialStateMissed(id)));
}

#[test]
fn sub_range_unmap_records_mapped_range() {
    let mut capture = capture();
    let buffer = capture.gen_buffer();
    capture.buffer_data(buffer, 2048, Some(&[1; 2048][..]), gl::DYNAMIC_DRAW);
    let id = capture.resource_id(ResourceKind::Buffer, buffer).unwrap();

    capture.begin_frame_capture();
    assert!(!capture.map_buffer_range(buffer, 512, 1024, gl::MAP_WRITE_BIT).is_null());
    capture.mapped_range_mut(buffer).unwrap()[100..104].copy_from_slice(&[9; 4]);
    assert!(capture.unmap_buffer(buffer));
    let frame = capture.end_frame_capture().unwrap().clone();

    // Only whole-buffer maps are diffed.
    assert_eq!(ops(&frame.chunks), vec![ChunkOp::Unmap]);
    let unmap: params::Unmap = frame.chunks[0].read().unwrap();
    assert_eq!(unmap.offset, 512);
    assert_eq!(unmap.data.len(), 1024);
    assert_eq!(&unmap.data[100..104], &[9; 4]);
    assert_eq!(unmap.data.iter().filter(|&&byte| byte == 1).count(), 1020);
    assert_eq!(capture.map_emulator().bytes_saved(), 0);

    let written = capture.gl().buffer_contents(buffer);
    assert_eq!(&written[612..616], &[9; 4]);
    let mut replay = replay(&capture, 0);
    replay.replay_log(1, 1, ReplayMode::Full).unwrap();
    let replayed = replay.live_name(id).unwrap();
    assert_eq!(replay.gl().buffer_contents(replayed), written);
}

#[test]
fn oversized_read_pixels_fails_replay() {
    let mut capture = capture();
    capture.begin_frame_capture();
    let mut pixels = [0; 64];
    capture.read_pixels(0, 0, 2, 2, gl::RGBA, gl::FLOAT, &mut pixels);
    capture.end_frame_capture().unwrap();

    let mut recording = capture.recording();
    recording.frames[0].chunks[0] = Chunk::new(
        ChunkOp::ReadPixels,
        &mut params::ReadPixels {
            x: 0,
            y: 0,
            width: i32::MAX,
            height: i32::MAX,
            format: gl::RGBA,
            ty: gl::FLOAT,
        },
    );
    let recording = Recording::read(&recording.to_bytes()).unwrap();
    let mut replay = GlReplay::new(FakeGl::new(), ctx(), &recording, 0).unwrap();
    assert!(matches!(
        replay.replay_log(1, 1, ReplayMode::Full),
        Err(ReplayError::Serial(SerialError::OutOfRange(_)))
    ));
}

#[test]
fn immutable_buffer_history_replays() {
    let mut capture = capture();
    let source = capture.gen_buffer();
    capture.buffer_data(source, 16, Some(&[9; 16][..]), gl::STATIC_DRAW);
    let buffer = capture.gen_buffer();
    capture.buffer_storage(buffer, 16, Some(&[6; 16][..]), gl::MAP_READ_BIT);
    let id = capture.resource_id(ResourceKind::Buffer, buffer).unwrap();
    capture.copy_buffer_sub_data(source, buffer, 0, 0, 8);

    capture.begin_frame_capture();
    assert!(!capture.map_buffer_range(buffer, 0, 16, gl::MAP_READ_BIT).is_null());
    capture.unmap_buffer(buffer);
    capture.draw_arrays(gl::POINTS, 0, 1);
    capture.end_frame_capture().unwrap();

    // The snapshot now stands in for the copy in the buffer's history.
    let history: Vec<Chunk> = capture
        .manager()
        .record(id)
        .unwrap()
        .chunks_before(u64::MAX, false)
        .into_iter()
        .map(|recorded| recorded.chunk)
        .collect();
    assert_eq!(ops(&history), vec![ChunkOp::CreateBuffer, ChunkOp::BufferStorage, ChunkOp::Unmap]);

    // Replaying that history alone must restore the contents, though the
    // storage refuses direct uploads.
    let mut recording = capture.recording();
    recording.frames[0].setup = history;
    recording.frames[0].initial.clear();
    let recording = Recording::read(&recording.to_bytes()).unwrap();
    let mut replay = GlReplay::new(FakeGl::new(), ctx(), &recording, 0).unwrap();
    replay.replay_log(1, 1, ReplayMode::Full).unwrap();
    let replayed = replay.live_name(id).unwrap();
    let mut expected = vec![9; 8];
    expected.extend_from_slice(&[6; 8]);
    assert_eq!(replay.gl().buffer_contents(replayed), expected);
    assert_eq!(replay.gl().invalid_operations(), 0);
}

#[test]
fn coherent_snapshot_precedes_pending_writes() {
    let mut capture = capture();
    let buffer = capture.gen_buffer();
    let flags = gl::MAP_WRITE_BIT | MAP_PERSISTENT_BIT | MAP_COHERENT_BIT;
    capture.buffer_storage(buffer, 64, Some(&[1; 64][..]), flags);
    let id = capture.resource_id(ResourceKind::Buffer, buffer).unwrap();
    assert!(!capture.map_buffer_range(buffer, 0, 64, flags).is_null());

    capture.begin_frame_capture();
    capture.mapped_range_mut(buffer).unwrap()[..4].copy_from_slice(&[5; 4]);
    capture.draw_arrays(gl::TRIANGLES, 0, 3);
    let frame = capture.end_frame_capture().unwrap().clone();

    assert_eq!(initial_contents(&frame, id), InitialContents::Buffer { data: vec![1; 64] });
    assert_eq!(ops(&frame.chunks), vec![ChunkOp::FlushMap, ChunkOp::DrawArrays]);
    assert_eq!(&capture.gl().buffer_contents(buffer)[..4], &[5; 4]);
}

#[test]
fn read_map_of_persistent_storage_flushes_nothing() {
    let mut capture = capture();
    let buffer = capture.gen_buffer();
    let flags = gl::MAP_READ_BIT | gl::MAP_WRITE_BIT | MAP_PERSISTENT_BIT | MAP_COHERENT_BIT
        | DYNAMIC_STORAGE_BIT;
    capture.buffer_storage(buffer, 32, None, flags);
    // The GPU writes the buffer.
    capture.gl().buffer_sub_data(buffer, 0, &[8; 32]);

    capture.begin_frame_capture();
    let access = gl::MAP_READ_BIT | MAP_PERSISTENT_BIT | MAP_COHERENT_BIT;
    assert!(!capture.map_buffer_range(buffer, 0, 32, access).is_null());
    assert_eq!(&capture.mapped_range_mut(buffer).unwrap()[..], &[8; 32][..]);
    capture.draw_arrays(gl::TRIANGLES, 0, 3);
    let frame = capture.end_frame_capture().unwrap().clone();

    assert_eq!(ops(&frame.chunks), vec![ChunkOp::DrawArrays]);
    assert!(capture.gl().flushes().is_empty());
}
