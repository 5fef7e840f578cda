//! Effect command types for XM patterns.
//!
//! Effects keep their raw parameter byte: the sequencer resolves effect
//! memory on the raw byte before interpreting nibbles.

/// Volume column command, decoded from the volume byte of a [`Note`](crate::Note)
/// (raw XM value minus 0x10).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VolumeCommand {
    #[default]
    None,
    /// Set volume (0-64)
    Volume(u8),
    VolumeSlideDown(u8),
    VolumeSlideUp(u8),
    FineVolSlideDown(u8),
    FineVolSlideUp(u8),
    /// Set vibrato speed nibble
    VibratoSpeed(u8),
    /// Vibrato with depth nibble
    Vibrato(u8),
    /// Set panning (0-15, scaled by 16)
    Panning(u8),
    PanSlideLeft(u8),
    PanSlideRight(u8),
    /// Tone portamento (speed nibble, scaled by 16)
    TonePorta(u8),
}

impl VolumeCommand {
    /// Decode a volume column byte. `0xFF` is the empty marker.
    pub fn from_byte(volume: u8) -> Self {
        let x = volume & 0x0F;
        match volume {
            0x00..=0x40 => VolumeCommand::Volume(volume),
            0x50..=0x5F => VolumeCommand::VolumeSlideDown(x),
            0x60..=0x6F => VolumeCommand::VolumeSlideUp(x),
            0x70..=0x7F => VolumeCommand::FineVolSlideDown(x),
            0x80..=0x8F => VolumeCommand::FineVolSlideUp(x),
            0x90..=0x9F => VolumeCommand::VibratoSpeed(x),
            0xA0..=0xAF => VolumeCommand::Vibrato(x),
            0xB0..=0xBF => VolumeCommand::Panning(x),
            0xC0..=0xCF => VolumeCommand::PanSlideLeft(x),
            0xD0..=0xDF => VolumeCommand::PanSlideRight(x),
            0xE0..=0xEF => VolumeCommand::TonePorta(x),
            _ => VolumeCommand::None,
        }
    }

    /// Returns the variant name as a static string (ignoring parameters).
    pub fn name(&self) -> &'static str {
        match self {
            VolumeCommand::None => "None",
            VolumeCommand::Volume(_) => "Volume",
            VolumeCommand::VolumeSlideDown(_) => "VolumeSlideDown",
            VolumeCommand::VolumeSlideUp(_) => "VolumeSlideUp",
            VolumeCommand::FineVolSlideDown(_) => "FineVolSlideDown",
            VolumeCommand::FineVolSlideUp(_) => "FineVolSlideUp",
            VolumeCommand::VibratoSpeed(_) => "VibratoSpeed",
            VolumeCommand::Vibrato(_) => "Vibrato",
            VolumeCommand::Panning(_) => "Panning",
            VolumeCommand::PanSlideLeft(_) => "PanSlideLeft",
            VolumeCommand::PanSlideRight(_) => "PanSlideRight",
            VolumeCommand::TonePorta(_) => "TonePorta",
        }
    }
}

/// Effect families that remember their last nonzero parameter per channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EffectFamily {
    PortaUp,
    PortaDown,
    TonePorta,
    Vibrato,
    Tremolo,
    VolumeSlide,
    SampleOffset,
    FinePortaUp,
    FinePortaDown,
    FineVolumeSlideUp,
    FineVolumeSlideDown,
    GlobalVolumeSlide,
    PanningSlide,
    MultiRetrig,
    Tremor,
    ExtraFinePortaUp,
    ExtraFinePortaDown,
}

impl EffectFamily {
    /// Number of families.
    pub const COUNT: usize = 17;

    /// Every family, in discriminant order.
    pub const ALL: [EffectFamily; Self::COUNT] = [
        EffectFamily::PortaUp,
        EffectFamily::PortaDown,
        EffectFamily::TonePorta,
        EffectFamily::Vibrato,
        EffectFamily::Tremolo,
        EffectFamily::VolumeSlide,
        EffectFamily::SampleOffset,
        EffectFamily::FinePortaUp,
        EffectFamily::FinePortaDown,
        EffectFamily::FineVolumeSlideUp,
        EffectFamily::FineVolumeSlideDown,
        EffectFamily::GlobalVolumeSlide,
        EffectFamily::PanningSlide,
        EffectFamily::MultiRetrig,
        EffectFamily::Tremor,
        EffectFamily::ExtraFinePortaUp,
        EffectFamily::ExtraFinePortaDown,
    ];

    /// Slot index into a per-channel memory table.
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Effect column command.
///
/// Covers the FastTracker 2 effect set. Parameters are raw bytes (or
/// the low nibble for `Exy` sub-effects).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Effect {
    #[default]
    None,

    // === Arpeggio & Portamento ===
    /// Arpeggio: cycle between note, note+x, note+y each tick
    Arpeggio { x: u8, y: u8 },
    /// Slide pitch up by amount per tick
    PortaUp(u8),
    /// Slide pitch down by amount per tick
    PortaDown(u8),
    /// Slide toward target note
    TonePorta(u8),
    /// Vibrato, speed in the high nibble and depth in the low nibble
    Vibrato(u8),
    /// Tone portamento + volume slide
    TonePortaVolSlide(u8),
    /// Vibrato + volume slide
    VibratoVolSlide(u8),

    // === Tremolo & Volume ===
    /// Tremolo, speed in the high nibble and depth in the low nibble
    Tremolo(u8),
    /// Set channel panning (0-255)
    SetPan(u8),
    /// Set sample offset (in 256-frame units)
    SampleOffset(u8),
    /// Volume slide, up in the high nibble, down in the low nibble
    VolumeSlide(u8),
    /// Jump to order position
    PositionJump(u8),
    /// Set channel volume (0-64)
    SetVolume(u8),
    /// Break to row in next pattern (decimal-decoded)
    PatternBreak(u8),

    // === Extended effects (Exy) ===
    FinePortaUp(u8),
    FinePortaDown(u8),
    /// Set vibrato waveform (0=sine, 1=ramp, 2=square; +4 = no retrig)
    SetVibratoWaveform(u8),
    /// Set finetune (-8 to +7, in 16ths of a semitone step)
    SetFinetune(i8),
    /// Pattern loop (0=set start, n=loop n times)
    PatternLoop(u8),
    SetTremoloWaveform(u8),
    /// Coarse panning (0-15, scaled by 16)
    SetPanCoarse(u8),
    /// Retrigger note every n ticks
    RetriggerNote(u8),
    FineVolumeSlideUp(u8),
    FineVolumeSlideDown(u8),
    /// Cut note after n ticks
    NoteCut(u8),
    /// Delay note by n ticks
    NoteDelay(u8),
    /// Delay pattern by n rows
    PatternDelay(u8),

    // === Speed & Tempo ===
    /// Set ticks per row (speed)
    SetSpeed(u8),
    /// Set BPM tempo
    SetTempo(u8),

    // === XM extensions ===
    /// Set global volume (0-64)
    SetGlobalVolume(u8),
    GlobalVolumeSlide(u8),
    /// Key off after n ticks
    KeyOff(u8),
    /// Set envelope position
    SetEnvelopePosition(u8),
    PanningSlide(u8),
    /// Retrigger with volume change (x = volume change, y = interval)
    MultiRetrig(u8),
    /// Tremor (x+1 ticks on, y+1 ticks off)
    Tremor(u8),
    ExtraFinePortaUp(u8),
    ExtraFinePortaDown(u8),
}

impl Effect {
    /// Decode an XM effect command/parameter pair.
    ///
    /// `command == 0xFF` is the empty marker of a decoded [`Note`](crate::Note).
    pub fn from_raw(command: u8, param: u8) -> Self {
        match command {
            0x00 if param != 0 => Effect::Arpeggio {
                x: param >> 4,
                y: param & 0x0F,
            },
            0x01 => Effect::PortaUp(param),
            0x02 => Effect::PortaDown(param),
            0x03 => Effect::TonePorta(param),
            0x04 => Effect::Vibrato(param),
            0x05 => Effect::TonePortaVolSlide(param),
            0x06 => Effect::VibratoVolSlide(param),
            0x07 => Effect::Tremolo(param),
            0x08 => Effect::SetPan(param),
            0x09 => Effect::SampleOffset(param),
            0x0A => Effect::VolumeSlide(param),
            0x0B => Effect::PositionJump(param),
            0x0C => Effect::SetVolume(param.min(64)),
            0x0D => Effect::PatternBreak((param >> 4) * 10 + (param & 0x0F)),
            0x0E => Self::from_extended(param),
            0x0F => match param {
                0 => Effect::None,
                1..=31 => Effect::SetSpeed(param),
                _ => Effect::SetTempo(param),
            },
            0x10 => Effect::SetGlobalVolume(param.min(64)),
            0x11 => Effect::GlobalVolumeSlide(param),
            0x14 => Effect::KeyOff(param),
            0x15 => Effect::SetEnvelopePosition(param),
            0x19 => Effect::PanningSlide(param),
            0x1B => Effect::MultiRetrig(param),
            0x1D => Effect::Tremor(param),
            0x21 => match param >> 4 {
                1 => Effect::ExtraFinePortaUp(param & 0x0F),
                2 => Effect::ExtraFinePortaDown(param & 0x0F),
                _ => Effect::None,
            },
            _ => Effect::None,
        }
    }

    /// Decode an extended effect (Exy).
    fn from_extended(param: u8) -> Self {
        let val = param & 0x0F;
        match param >> 4 {
            0x1 => Effect::FinePortaUp(val),
            0x2 => Effect::FinePortaDown(val),
            0x4 => Effect::SetVibratoWaveform(val),
            0x5 => Effect::SetFinetune(if val > 7 { val as i8 - 16 } else { val as i8 }),
            0x6 => Effect::PatternLoop(val),
            0x7 => Effect::SetTremoloWaveform(val),
            0x8 => Effect::SetPanCoarse(val),
            0x9 => Effect::RetriggerNote(val),
            0xA => Effect::FineVolumeSlideUp(val),
            0xB => Effect::FineVolumeSlideDown(val),
            0xC => Effect::NoteCut(val),
            0xD => Effect::NoteDelay(val),
            0xE => Effect::PatternDelay(val),
            _ => Effect::None,
        }
    }

    /// The memory family and raw parameter of effects that recall their
    /// last nonzero parameter.
    pub fn memory(&self) -> Option<(EffectFamily, u8)> {
        let slot = match *self {
            Effect::PortaUp(p) => (EffectFamily::PortaUp, p),
            Effect::PortaDown(p) => (EffectFamily::PortaDown, p),
            Effect::TonePorta(p) => (EffectFamily::TonePorta, p),
            Effect::Vibrato(p) => (EffectFamily::Vibrato, p),
            Effect::Tremolo(p) => (EffectFamily::Tremolo, p),
            Effect::VolumeSlide(p)
            | Effect::TonePortaVolSlide(p)
            | Effect::VibratoVolSlide(p) => (EffectFamily::VolumeSlide, p),
            Effect::SampleOffset(p) => (EffectFamily::SampleOffset, p),
            Effect::FinePortaUp(p) => (EffectFamily::FinePortaUp, p),
            Effect::FinePortaDown(p) => (EffectFamily::FinePortaDown, p),
            Effect::FineVolumeSlideUp(p) => (EffectFamily::FineVolumeSlideUp, p),
            Effect::FineVolumeSlideDown(p) => (EffectFamily::FineVolumeSlideDown, p),
            Effect::GlobalVolumeSlide(p) => (EffectFamily::GlobalVolumeSlide, p),
            Effect::PanningSlide(p) => (EffectFamily::PanningSlide, p),
            Effect::MultiRetrig(p) => (EffectFamily::MultiRetrig, p),
            Effect::Tremor(p) => (EffectFamily::Tremor, p),
            Effect::ExtraFinePortaUp(p) => (EffectFamily::ExtraFinePortaUp, p),
            Effect::ExtraFinePortaDown(p) => (EffectFamily::ExtraFinePortaDown, p),
            _ => return None,
        };
        Some(slot)
    }

    /// Replace the parameter of an effect that has memory. Other effects
    /// are returned unchanged.
    pub fn with_param(self, p: u8) -> Self {
        match self {
            Effect::PortaUp(_) => Effect::PortaUp(p),
            Effect::PortaDown(_) => Effect::PortaDown(p),
            Effect::TonePorta(_) => Effect::TonePorta(p),
            Effect::Vibrato(_) => Effect::Vibrato(p),
            Effect::Tremolo(_) => Effect::Tremolo(p),
            Effect::VolumeSlide(_) => Effect::VolumeSlide(p),
            Effect::TonePortaVolSlide(_) => Effect::TonePortaVolSlide(p),
            Effect::VibratoVolSlide(_) => Effect::VibratoVolSlide(p),
            Effect::SampleOffset(_) => Effect::SampleOffset(p),
            Effect::FinePortaUp(_) => Effect::FinePortaUp(p),
            Effect::FinePortaDown(_) => Effect::FinePortaDown(p),
            Effect::FineVolumeSlideUp(_) => Effect::FineVolumeSlideUp(p),
            Effect::FineVolumeSlideDown(_) => Effect::FineVolumeSlideDown(p),
            Effect::GlobalVolumeSlide(_) => Effect::GlobalVolumeSlide(p),
            Effect::PanningSlide(_) => Effect::PanningSlide(p),
            Effect::MultiRetrig(_) => Effect::MultiRetrig(p),
            Effect::Tremor(_) => Effect::Tremor(p),
            Effect::ExtraFinePortaUp(_) => Effect::ExtraFinePortaUp(p),
            Effect::ExtraFinePortaDown(_) => Effect::ExtraFinePortaDown(p),
            other => other,
        }
    }

    /// Returns true for tone portamento variants, which set a target
    /// period instead of retriggering the note.
    pub fn is_tone_porta(&self) -> bool {
        matches!(self, Effect::TonePorta(_) | Effect::TonePortaVolSlide(_))
    }

    /// Returns the variant name as a static string (ignoring parameters).
    pub fn name(&self) -> &'static str {
        match self {
            Effect::None => "None",
            Effect::Arpeggio { .. } => "Arpeggio",
            Effect::PortaUp(_) => "PortaUp",
            Effect::PortaDown(_) => "PortaDown",
            Effect::TonePorta(_) => "TonePorta",
            Effect::Vibrato(_) => "Vibrato",
            Effect::TonePortaVolSlide(_) => "TonePortaVolSlide",
            Effect::VibratoVolSlide(_) => "VibratoVolSlide",
            Effect::Tremolo(_) => "Tremolo",
            Effect::SetPan(_) => "SetPan",
            Effect::SampleOffset(_) => "SampleOffset",
            Effect::VolumeSlide(_) => "VolumeSlide",
            Effect::PositionJump(_) => "PositionJump",
            Effect::SetVolume(_) => "SetVolume",
            Effect::PatternBreak(_) => "PatternBreak",
            Effect::FinePortaUp(_) => "FinePortaUp",
            Effect::FinePortaDown(_) => "FinePortaDown",
            Effect::SetVibratoWaveform(_) => "SetVibratoWaveform",
            Effect::SetFinetune(_) => "SetFinetune",
            Effect::PatternLoop(_) => "PatternLoop",
            Effect::SetTremoloWaveform(_) => "SetTremoloWaveform",
            Effect::SetPanCoarse(_) => "SetPanCoarse",
            Effect::RetriggerNote(_) => "RetriggerNote",
            Effect::FineVolumeSlideUp(_) => "FineVolumeSlideUp",
            Effect::FineVolumeSlideDown(_) => "FineVolumeSlideDown",
            Effect::NoteCut(_) => "NoteCut",
            Effect::NoteDelay(_) => "NoteDelay",
            Effect::PatternDelay(_) => "PatternDelay",
            Effect::SetSpeed(_) => "SetSpeed",
            Effect::SetTempo(_) => "SetTempo",
            Effect::SetGlobalVolume(_) => "SetGlobalVolume",
            Effect::GlobalVolumeSlide(_) => "GlobalVolumeSlide",
            Effect::KeyOff(_) => "KeyOff",
            Effect::SetEnvelopePosition(_) => "SetEnvelopePosition",
            Effect::PanningSlide(_) => "PanningSlide",
            Effect::MultiRetrig(_) => "MultiRetrig",
            Effect::Tremor(_) => "Tremor",
            Effect::ExtraFinePortaUp(_) => "ExtraFinePortaUp",
            Effect::ExtraFinePortaDown(_) => "ExtraFinePortaDown",
        }
    }
}
