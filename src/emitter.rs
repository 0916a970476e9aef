use std::io::Write;

use crate::descriptor::DescriptorKind;
use crate::error::Result;
use crate::feature::CompletedTrack;
use crate::trajectory::TrajectoryShape;

/// One accepted trajectory, ready to be written out.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    pub shape: TrajectoryShape,
    pub scale: f32,
    /// HOG, HOF, MBH-x, MBH-y, each averaged per temporal cell
    pub descriptors: [Vec<f32>; 4],
}

impl Record {
    pub fn new(shape: TrajectoryShape, track: CompletedTrack) -> Self {
        Record {
            shape,
            scale: track.scale,
            descriptors: track.descriptors,
        }
    }

    pub fn descriptor(&self, kind: DescriptorKind) -> &[f32] {
        &self.descriptors[kind.index()]
    }

    /// Number of values in the record
    pub fn field_count(&self) -> usize {
        6 + 2 * self.shape.displacements.len() + self.descriptors.iter().map(Vec::len).sum::<usize>()
    }
}

/// Sink for accepted trajectories.
pub trait Emitter {
    fn emit(&mut self, record: &Record) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Tab separated text, one line per record.
pub struct TextEmitter<W: Write> {
    writer: W,
    pub count: usize,
}

impl<W: Write> TextEmitter<W> {
    pub fn new(writer: W) -> Self {
        TextEmitter { writer, count: 0 }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Emitter for TextEmitter<W> {
    fn emit(&mut self, record: &Record) -> Result<()> {
        let shape = &record.shape;
        let w = &mut self.writer;
        for v in [
            shape.mean.x,
            shape.mean.y,
            shape.var.x,
            shape.var.y,
            shape.length,
            record.scale,
        ] {
            write!(w, "{v:.6}\t")?;
        }
        for d in &shape.displacements {
            write!(w, "{:.6}\t{:.6}\t", d.x, d.y)?;
        }
        for kind in DescriptorKind::ALL {
            for v in record.descriptor(kind) {
                write!(w, "{v:.7}\t")?;
            }
        }
        writeln!(w)?;
        self.count += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Keeps every record in memory.
#[derive(Debug, Default)]
pub struct VecEmitter {
    pub records: Vec<Record>,
}

impl Emitter for VecEmitter {
    fn emit(&mut self, record: &Record) -> Result<()> {
        self.records.push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::my_types::*;

    fn record() -> Record {
        Record {
            shape: TrajectoryShape {
                mean: Vector2f::new(12., 10.),
                var: Vector2f::new(1.5, 0.),
                length: 4.,
                displacements: vec![Vector2f::new(0.25, 0.); 2],
            },
            scale: 1.4142135,
            descriptors: [vec![0.5, 0.25], vec![1.], vec![0.125], vec![0., 0.0000001]],
        }
    }

    #[test]
    fn test_text_layout() {
        let mut emitter = TextEmitter::new(vec![]);
        emitter.emit(&record()).unwrap();
        emitter.emit(&record()).unwrap();
        assert_eq!(emitter.count, 2);
        let text = String::from_utf8(emitter.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            "12.000000\t10.000000\t1.500000\t0.000000\t4.000000\t1.414214\t\
             0.250000\t0.000000\t0.250000\t0.000000\t\
             0.5000000\t0.2500000\t1.0000000\t0.1250000\t0.0000000\t0.0000001\t"
        );
        assert!(text.ends_with("\t\n"));
    }

    #[test]
    fn test_uniform_field_count() {
        let r = record();
        let mut emitter = TextEmitter::new(vec![]);
        emitter.emit(&r).unwrap();
        let text = String::from_utf8(emitter.into_inner()).unwrap();
        let fields = text.trim_end_matches('\n').split('\t').filter(|f| !f.is_empty());
        assert_eq!(fields.count(), r.field_count());
        assert_eq!(r.field_count(), 6 + 4 + 6);
    }

    #[test]
    fn test_collecting() {
        let mut emitter = VecEmitter::default();
        emitter.emit(&record()).unwrap();
        assert_eq!(emitter.records, vec![record()]);
    }
}
