//! Tick sequencer: the tick/row/order state machine.
//!
//! One call to [`TickSequencer::process_tick`] advances playback by one
//! tracker tick. On tick 0 of a row the pattern row is decoded and notes,
//! volume column commands and row effects are applied; on every tick the
//! continuous effects, envelopes and fadeout run and the result is pushed
//! to the mixer slot of each channel.

use tm_ir::{
    Effect, EffectFamily, Instrument, Note, NoteKey, PatternDecoder, Sample, Song, VolumeCommand,
};

use crate::channel::{Channel, MAX_VOLUME};
use crate::config::MAX_CHANNELS;
use crate::effect_memory::EffectMemory;
use crate::frequency::{arpeggio_period, clamp_period, note_period, FrequencyTables};
use crate::mixer::SoftwareMixer;

/// Playback state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PlayState {
    #[default]
    Stopped,
    Playing,
}

/// Song position of the tick about to be processed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Position {
    /// Index into the order list
    pub order: usize,
    /// Pattern played at `order`
    pub pattern: u8,
    pub row: u16,
    pub tick: u8,
}

/// Decoded row data a channel keeps for the ticks of its row.
#[derive(Clone, Copy, Debug, Default)]
struct RowState {
    /// Effect with memory resolved
    effect: Effect,
    volume: VolumeCommand,
    /// Note held back by EDx
    delayed: Option<Note>,
}

/// Timing and pending jumps.
#[derive(Clone, Copy, Debug)]
struct Transport {
    order: usize,
    row: u16,
    tick: u8,
    speed: u8,
    tempo: u8,
    global_volume: u8,
    /// Whole rows still to repeat (EEx)
    pattern_delay: u8,
    /// The current pass over the row is a pattern-delay repeat
    delay_repeat: bool,
    /// Bxx
    next_order: Option<usize>,
    /// Dxx
    next_row: Option<u16>,
    /// E6x
    loop_row: Option<u16>,
}

impl Transport {
    const IDLE: Transport = Transport {
        order: 0,
        row: 0,
        tick: 0,
        speed: 6,
        tempo: 125,
        global_volume: 64,
        pattern_delay: 0,
        delay_repeat: false,
        next_order: None,
        next_row: None,
        loop_row: None,
    };

    fn start(song: &Song, order: usize) -> Self {
        Self {
            order,
            speed: song.initial_speed.max(1),
            tempo: song.initial_tempo.max(32),
            global_volume: song.global_volume.min(64),
            ..Self::IDLE
        }
    }
}

/// Drives the channels of one song.
pub struct TickSequencer {
    song: Option<Song>,
    channels: heapless::Vec<Channel, MAX_CHANNELS>,
    rows: [RowState; MAX_CHANNELS],
    decoder: PatternDecoder,
    tables: FrequencyTables,
    transport: Transport,
    state: PlayState,
    looping: bool,
    reached_end: bool,
}

impl Default for TickSequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl TickSequencer {
    pub fn new() -> Self {
        Self {
            song: None,
            channels: heapless::Vec::new(),
            rows: [RowState::default(); MAX_CHANNELS],
            decoder: PatternDecoder::new(),
            tables: FrequencyTables::new(),
            transport: Transport::IDLE,
            state: PlayState::Stopped,
            looping: false,
            reached_end: false,
        }
    }

    /// Take ownership of a validated song. Any previous song is dropped and
    /// playback is stopped; the caller silences the mixer.
    pub fn load(&mut self, song: Song) {
        self.state = PlayState::Stopped;
        self.channels.clear();
        self.song = Some(song);
    }

    /// Stop and give the song back.
    pub fn unload(&mut self) -> Option<Song> {
        self.state = PlayState::Stopped;
        self.channels.clear();
        self.song.take()
    }

    pub fn song(&self) -> Option<&Song> {
        self.song.as_ref()
    }

    /// Start playback at an order index (clamped to the order list).
    /// Returns false if no song is loaded.
    pub fn play(&mut self, looping: bool, start_order: usize) -> bool {
        let Some(song) = self.song.as_ref() else {
            return false;
        };
        let order = start_order.min(song.order.len().saturating_sub(1));
        self.transport = Transport::start(song, order);
        self.channels.clear();
        for _ in 0..(song.channel_count as usize).min(MAX_CHANNELS) {
            let _ = self.channels.push(Channel::new());
        }
        self.rows = [RowState::default(); MAX_CHANNELS];
        self.decoder.reset();
        self.looping = looping;
        self.reached_end = false;
        self.state = PlayState::Playing;
        true
    }

    /// Stop playback and silence the slots driven by this sequencer.
    pub fn stop(&mut self, mixer: &mut SoftwareMixer) {
        self.state = PlayState::Stopped;
        for (slot, ch) in self.channels.iter_mut().enumerate() {
            ch.active = false;
            mixer.set_active(slot, false);
        }
    }

    /// Advance by one tick. Returns false when not playing. The last tick
    /// of a one-shot song still plays and sets [`reached_end`](Self::reached_end);
    /// the call after it stops playback and returns false.
    pub fn process_tick(&mut self, mixer: &mut SoftwareMixer) -> bool {
        if self.state != PlayState::Playing {
            return false;
        }
        if self.reached_end {
            self.stop(mixer);
            return false;
        }
        let Some(song) = self.song.as_ref() else {
            debug_assert!(false, "playing without a song");
            self.state = PlayState::Stopped;
            return false;
        };
        debug_assert!(mixer.slot_count() >= self.channels.len());

        let tables = &self.tables;
        let t = &mut self.transport;
        if t.tick == 0 && !t.delay_repeat {
            start_row(song, &mut self.decoder, &mut self.channels, &mut self.rows, t, mixer);
        }
        for (slot, (ch, row)) in self.channels.iter_mut().zip(self.rows.iter_mut()).enumerate() {
            tick_channel(song, tables, t, slot, ch, row, mixer);
            update_mixer(song, tables, t.global_volume, slot, ch, mixer);
        }

        t.tick += 1;
        if t.tick < t.speed {
            return true;
        }
        t.tick = 0;
        if t.pattern_delay > 0 {
            t.pattern_delay -= 1;
            t.delay_repeat = true;
            return true;
        }
        t.delay_repeat = false;
        if advance_row(song, t, &mut self.decoder, &mut self.channels, self.looping) {
            return true;
        }
        self.reached_end = true;
        true
    }

    pub fn state(&self) -> PlayState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlayState::Playing
    }

    /// True once a one-shot song has played past its last order.
    pub fn reached_end(&self) -> bool {
        self.reached_end
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn position(&self) -> Position {
        let t = &self.transport;
        let pattern = self.song.as_ref().and_then(|s| s.order.get(t.order).copied()).unwrap_or(0);
        Position { order: t.order, pattern, row: t.row, tick: t.tick }
    }

    /// Ticks per row.
    pub fn speed(&self) -> u8 {
        self.transport.speed
    }

    /// Tempo in BPM; a tick lasts 2.5 / tempo seconds.
    pub fn tempo(&self) -> u8 {
        self.transport.tempo
    }

    pub fn global_volume(&self) -> u8 {
        self.transport.global_volume
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn channel(&self, index: usize) -> Option<&Channel> {
        self.channels.get(index)
    }
}

fn instrument_of<'a>(song: &'a Song, ch: &Channel) -> Option<&'a Instrument> {
    song.instruments.get(ch.instrument? as usize)
}

fn sample_of<'a>(instrument: &'a Instrument, ch: &Channel) -> Option<&'a Sample> {
    instrument.samples.get(ch.sample? as usize)
}

/// Substitute remembered parameters for zero parameters.
fn resolve(effect: Effect, memory: &mut EffectMemory) -> Effect {
    match effect.memory() {
        Some((family, param)) => effect.with_param(memory.recall(family, param)),
        None => effect,
    }
}

fn tone_porta_speed(ch: &Channel) -> u16 {
    ch.memory.get(EffectFamily::TonePorta) as u16 * 4
}

/// Tick 0 of a fresh row: decode and apply the row of every channel.
fn start_row(
    song: &Song,
    decoder: &mut PatternDecoder,
    channels: &mut [Channel],
    rows: &mut [RowState],
    t: &mut Transport,
    mixer: &mut SoftwareMixer,
) {
    let Some(pattern) = song.pattern_at(t.order) else {
        debug_assert!(false, "order {} has no pattern", t.order);
        return;
    };
    for (slot, (ch, row)) in channels.iter_mut().zip(rows.iter_mut()).enumerate() {
        let note = decoder.decompress_note(pattern, t.row, slot as u8);
        let effect = resolve(note.effect(), &mut ch.memory);
        *row = RowState { effect, volume: note.volume_command(), delayed: None };
        if matches!(effect, Effect::NoteDelay(x) if x > 0) {
            row.delayed = Some(note);
            continue;
        }
        play_note(song, slot, ch, &note, effect, row.volume, mixer);
        volume_column_row(ch, row.volume);
        row_effect(song, t, ch, effect);
    }
}

/// Apply the note and instrument columns.
fn play_note(
    song: &Song,
    slot: usize,
    ch: &mut Channel,
    note: &Note,
    effect: Effect,
    volume: VolumeCommand,
    mixer: &mut SoftwareMixer,
) {
    let mut new_instrument = false;
    if let Some(index) = note.instrument() {
        if (index as usize) < song.instruments.len() {
            ch.instrument = Some(index);
            new_instrument = true;
        } else {
            ch.instrument = None;
        }
    }

    match note.key() {
        NoteKey::Off => {
            let instrument = instrument_of(song, ch);
            ch.key_off(instrument);
            return;
        }
        NoteKey::On(n) => {
            let porta = effect.is_tone_porta() || matches!(volume, VolumeCommand::TonePorta(_));
            if porta && ch.active {
                if let Some(period) = target_period(song, ch, n) {
                    ch.target_period = period;
                }
            } else {
                trigger(song, slot, ch, n, effect, mixer);
            }
        }
        NoteKey::None => {}
    }

    if new_instrument {
        let Some(instrument) = instrument_of(song, ch) else {
            return;
        };
        if let Some(sample) = sample_of(instrument, ch) {
            ch.set_volume(sample.volume);
            ch.panning = sample.panning;
        }
        ch.restart_instrument(instrument);
    }
}

/// Period a tone portamento toward note `n` slides to.
fn target_period(song: &Song, ch: &Channel, n: u8) -> Option<u16> {
    let instrument = instrument_of(song, ch)?;
    let sample = instrument.samples.get(instrument.sample_for_note(n)?)?;
    let semitone = n as i16 - 1 + sample.relative_note as i16;
    Some(note_period(song.frequency_mode, semitone, ch.finetune))
}

/// Start note `n` on the channel's instrument.
fn trigger(song: &Song, slot: usize, ch: &mut Channel, n: u8, effect: Effect, mixer: &mut SoftwareMixer) {
    let Some(instrument) = instrument_of(song, ch) else {
        ch.active = false;
        return;
    };
    let Some(index) = instrument.sample_for_note(n) else {
        ch.active = false;
        return;
    };
    let sample = &instrument.samples[index];
    ch.note = n;
    ch.sample = Some(index as u8);
    ch.finetune = match effect {
        Effect::SetFinetune(f) => f * 16,
        _ => sample.finetune,
    };
    let semitone = n as i16 - 1 + sample.relative_note as i16;
    let period = note_period(song.frequency_mode, semitone, ch.finetune);
    ch.base_period = period;
    ch.period = period;
    ch.target_period = period;
    ch.restart_instrument(instrument);

    let offset = match effect {
        Effect::SampleOffset(p) => p as u32 * 256,
        _ => 0,
    };
    ch.active = sample
        .mixer_id
        .is_some_and(|key| mixer.setup_pcm(slot, key, sample.sample_loop(), offset));
}

/// Restart the playing sample from its beginning (E9x, Rxy).
fn retrigger(song: &Song, slot: usize, ch: &mut Channel, mixer: &mut SoftwareMixer) {
    let Some(instrument) = instrument_of(song, ch) else {
        return;
    };
    let Some(sample) = sample_of(instrument, ch) else {
        return;
    };
    ch.restart_instrument(instrument);
    ch.active = sample
        .mixer_id
        .is_some_and(|key| mixer.setup_pcm(slot, key, sample.sample_loop(), 0));
}

/// Volume column commands that act on tick 0.
fn volume_column_row(ch: &mut Channel, command: VolumeCommand) {
    match command {
        VolumeCommand::Volume(v) => ch.set_volume(v),
        VolumeCommand::FineVolSlideDown(x) => ch.add_volume(-(x as i16)),
        VolumeCommand::FineVolSlideUp(x) => ch.add_volume(x as i16),
        VolumeCommand::VibratoSpeed(x) if x != 0 => {
            let depth = ch.memory.get(EffectFamily::Vibrato) & 0x0F;
            ch.memory.store(EffectFamily::Vibrato, x << 4 | depth);
        }
        VolumeCommand::Vibrato(x) if x != 0 => {
            let speed = ch.memory.get(EffectFamily::Vibrato) & 0xF0;
            ch.memory.store(EffectFamily::Vibrato, speed | x);
        }
        VolumeCommand::Panning(x) => ch.panning = x << 4,
        VolumeCommand::TonePorta(x) if x != 0 => ch.memory.store(EffectFamily::TonePorta, x << 4),
        _ => {}
    }
}

/// Volume column commands that act on ticks after the first.
fn volume_column_tick(ch: &mut Channel, command: VolumeCommand) {
    match command {
        VolumeCommand::VolumeSlideDown(x) => ch.add_volume(-(x as i16)),
        VolumeCommand::VolumeSlideUp(x) => ch.add_volume(x as i16),
        VolumeCommand::PanSlideLeft(x) => ch.add_panning(-(x as i16)),
        VolumeCommand::PanSlideRight(x) => ch.add_panning(x as i16),
        VolumeCommand::TonePorta(_) => {
            let speed = tone_porta_speed(ch);
            ch.tone_porta(speed);
        }
        _ => {}
    }
}

/// Effects that act once, on tick 0.
fn row_effect(song: &Song, t: &mut Transport, ch: &mut Channel, effect: Effect) {
    match effect {
        Effect::SetPan(p) => ch.panning = p,
        Effect::PositionJump(order) => t.next_order = Some(order as usize),
        Effect::SetVolume(v) => ch.set_volume(v),
        Effect::PatternBreak(row) => t.next_row = Some(row as u16),
        Effect::FinePortaUp(x) => ch.slide_period(-(x as i32 * 4)),
        Effect::FinePortaDown(x) => ch.slide_period(x as i32 * 4),
        Effect::SetVibratoWaveform(x) => ch.vibrato.set_control(x),
        Effect::SetFinetune(f) => ch.finetune = f * 16,
        Effect::PatternLoop(count) => pattern_loop(t, ch, count),
        Effect::SetTremoloWaveform(x) => ch.tremolo.set_control(x),
        Effect::SetPanCoarse(x) => ch.panning = x << 4,
        Effect::FineVolumeSlideUp(x) => ch.add_volume(x as i16),
        Effect::FineVolumeSlideDown(x) => ch.add_volume(-(x as i16)),
        Effect::NoteCut(0) => ch.volume = 0,
        Effect::PatternDelay(rows) => t.pattern_delay = rows,
        Effect::SetSpeed(speed) => t.speed = speed,
        Effect::SetTempo(tempo) => t.tempo = tempo,
        Effect::SetGlobalVolume(v) => t.global_volume = v.min(64),
        Effect::KeyOff(0) => {
            let instrument = instrument_of(song, ch);
            ch.key_off(instrument);
        }
        Effect::SetEnvelopePosition(tick) => {
            if let Some(instrument) = instrument_of(song, ch) {
                ch.volume_envelope.set_position(&instrument.volume_envelope, tick as u16);
                ch.panning_envelope.set_position(&instrument.panning_envelope, tick as u16);
            }
        }
        Effect::ExtraFinePortaUp(x) => ch.slide_period(-(x as i32)),
        Effect::ExtraFinePortaDown(x) => ch.slide_period(x as i32),
        _ => {}
    }
}

/// E6x: E60 marks the loop start, E6x repeats back to it x times.
fn pattern_loop(t: &mut Transport, ch: &mut Channel, count: u8) {
    if count == 0 {
        ch.loop_row = t.row;
        return;
    }
    if ch.loop_count == 0 {
        ch.loop_count = count;
    } else {
        ch.loop_count -= 1;
        if ch.loop_count == 0 {
            return;
        }
    }
    t.loop_row = Some(ch.loop_row);
}

/// Every tick: continuous effects, modulation, envelopes.
fn tick_channel(
    song: &Song,
    tables: &FrequencyTables,
    t: &mut Transport,
    slot: usize,
    ch: &mut Channel,
    row: &mut RowState,
    mixer: &mut SoftwareMixer,
) {
    let tick = t.tick;
    if tick > 0 {
        if let (Some(note), Effect::NoteDelay(x)) = (row.delayed, row.effect) {
            if tick == x {
                row.delayed = None;
                play_note(song, slot, ch, &note, row.effect, row.volume, mixer);
                volume_column_row(ch, row.volume);
            }
        }
        volume_column_tick(ch, row.volume);
        effect_tick(song, t, slot, ch, row.effect, mixer);
    }

    ch.period = ch.base_period;
    ch.out_volume = ch.volume;
    if let Effect::Arpeggio { x, y } = row.effect {
        let semitones = match tick % 3 {
            1 => x,
            2 => y,
            _ => 0,
        };
        ch.period = arpeggio_period(song.frequency_mode, ch.base_period, semitones);
    }
    let vibrato = matches!(row.effect, Effect::Vibrato(_) | Effect::VibratoVolSlide(_))
        || matches!(row.volume, VolumeCommand::Vibrato(_));
    if vibrato && tick > 0 && ch.period != 0 {
        let delta = ch.vibrato_delta(ch.memory.get(EffectFamily::Vibrato));
        ch.period = clamp_period(ch.period as i32 + delta);
    }
    if tick > 0 {
        match row.effect {
            Effect::Tremolo(p) => ch.apply_tremolo(p),
            Effect::Tremor(p) => ch.apply_tremor(p),
            _ => {}
        }
    }

    if let Some(instrument) = instrument_of(song, ch) {
        ch.advance_instrument(instrument);
        let delta = ch.auto_vibrato.step(&instrument.vibrato, ch.key_on, tables);
        if delta != 0 && ch.period != 0 {
            ch.period = clamp_period(ch.period as i32 + delta);
        }
        if !ch.key_on && ch.fadeout == 0 {
            ch.active = false;
        }
    }
}

/// Effects that act on ticks after the first.
fn effect_tick(
    song: &Song,
    t: &mut Transport,
    slot: usize,
    ch: &mut Channel,
    effect: Effect,
    mixer: &mut SoftwareMixer,
) {
    match effect {
        Effect::PortaUp(p) => ch.slide_period(-(p as i32 * 4)),
        Effect::PortaDown(p) => ch.slide_period(p as i32 * 4),
        Effect::TonePorta(_) => {
            let speed = tone_porta_speed(ch);
            ch.tone_porta(speed);
        }
        Effect::TonePortaVolSlide(p) => {
            let speed = tone_porta_speed(ch);
            ch.tone_porta(speed);
            ch.slide_volume(p);
        }
        Effect::VolumeSlide(p) | Effect::VibratoVolSlide(p) => ch.slide_volume(p),
        Effect::RetriggerNote(x) if x > 0 && t.tick % x == 0 => retrigger(song, slot, ch, mixer),
        Effect::NoteCut(x) if t.tick == x => ch.volume = 0,
        Effect::GlobalVolumeSlide(p) => {
            let up = (p >> 4) as i16;
            let delta = if up != 0 { up } else { -((p & 0x0F) as i16) };
            t.global_volume = (t.global_volume as i16 + delta).clamp(0, MAX_VOLUME as i16) as u8;
        }
        Effect::KeyOff(x) if t.tick == x => {
            let instrument = instrument_of(song, ch);
            ch.key_off(instrument);
        }
        Effect::PanningSlide(p) => ch.slide_panning(p),
        Effect::MultiRetrig(p) => {
            ch.retrig_count = ch.retrig_count.saturating_add(1);
            let interval = p & 0x0F;
            if interval != 0 && ch.retrig_count >= interval {
                ch.retrig_count = 0;
                ch.multi_retrig_volume(p >> 4);
                retrigger(song, slot, ch, mixer);
            }
        }
        _ => {}
    }
}

/// Push channel output to its mixer slot.
fn update_mixer(
    song: &Song,
    tables: &FrequencyTables,
    global_volume: u8,
    slot: usize,
    ch: &mut Channel,
    mixer: &mut SoftwareMixer,
) {
    if !ch.active {
        mixer.set_active(slot, false);
        return;
    }
    mixer.set_frequency(slot, tables.period_to_hz(song.frequency_mode, ch.period));
    mixer.set_volume(slot, ch.final_volume(global_volume));
    mixer.set_panning(slot, ch.final_panning() as i16 - 128);
    if !mixer.set_active(slot, true) {
        ch.active = false;
    }
}

/// Move to the next row, following pending jumps. Returns false when a
/// one-shot song runs off the end of its order list.
fn advance_row(
    song: &Song,
    t: &mut Transport,
    decoder: &mut PatternDecoder,
    channels: &mut [Channel],
    looping: bool,
) -> bool {
    let rows = song.pattern_at(t.order).map_or(1, |p| p.rows);
    if let Some(row) = t.loop_row.take() {
        t.next_order = None;
        t.next_row = None;
        t.row = row;
        return true;
    }
    let (order, row) = match (t.next_order.take(), t.next_row.take()) {
        (None, None) if t.row + 1 < rows => {
            t.row += 1;
            return true;
        }
        (None, None) => (t.order + 1, 0),
        (jump, brk) => (jump.unwrap_or(t.order + 1), brk.unwrap_or(0)),
    };
    let order = if order < song.order.len() {
        order
    } else if looping {
        song.restart_position as usize
    } else {
        return false;
    };
    let rows = song.pattern_at(order).map_or(1, |p| p.rows);
    t.order = order;
    t.row = if row < rows { row } else { 0 };
    decoder.reset();
    for ch in channels {
        ch.loop_row = 0;
        ch.loop_count = 0;
    }
    true
}
