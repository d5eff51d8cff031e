//! Receivers for the encoder's output lines.

use std::io::{LineWriter, Stdout, Write};

/// Called once per encoder output line, in arrival order, on the thread
/// running the pipeline. `line` includes its trailing newline when the
/// encoder wrote one. Blocking here stalls the whole pipeline.
pub trait LineConsumer {
    fn on_line(&mut self, line: &str);
}

impl<F> LineConsumer for F
where
    F: FnMut(&str),
{
    fn on_line(&mut self, line: &str) {
        self(line)
    }
}

/// Writes every line to `W` and flushes it straight away, so a reader on
/// the other end sees progress live. Write errors are ignored: a closed
/// output must not abort the run, the processes still need reaping.
pub struct WriterConsumer<W: Write> {
    out: W,
}

/// Default consumer used when `run` is given none.
pub type StdoutConsumer = WriterConsumer<LineWriter<Stdout>>;

impl<W: Write> WriterConsumer<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl StdoutConsumer {
    pub fn stdout() -> Self {
        Self::new(LineWriter::new(std::io::stdout()))
    }
}

impl<W: Write> LineConsumer for WriterConsumer<W> {
    fn on_line(&mut self, line: &str) {
        let _ = self.out.write_all(line.as_bytes());
        let _ = self.out.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn closures_are_consumers() {
        let mut seen = Vec::new();
        {
            let mut push = |line: &str| seen.push(line.to_string());
            let consumer: &mut dyn LineConsumer = &mut push;
            consumer.on_line("a\n");
            consumer.on_line("b\n");
        }
        assert_eq!(seen, vec!["a\n", "b\n"]);
    }

    #[derive(Debug, PartialEq)]
    enum Op {
        Write(Vec<u8>),
        Flush,
    }

    /// Records writes and flushes in the order they happen.
    #[derive(Clone, Default)]
    struct Recorder(Rc<RefCell<Vec<Op>>>);

    impl Write for Recorder {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.borrow_mut().push(Op::Write(buf.to_vec()));
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.0.borrow_mut().push(Op::Flush);
            Ok(())
        }
    }

    #[test]
    fn writer_consumer_flushes_after_every_line() {
        let recorder = Recorder::default();
        let mut consumer = WriterConsumer::new(recorder.clone());
        consumer.on_line("{\"sid\": 1}\n");
        consumer.on_line("tail \u{fffd}");

        let ops = recorder.0.borrow();
        assert_eq!(
            *ops,
            vec![
                Op::Write(b"{\"sid\": 1}\n".to_vec()),
                Op::Flush,
                Op::Write("tail \u{fffd}".as_bytes().to_vec()),
                Op::Flush,
            ]
        );
    }

    struct Broken;

    impl Write for Broken {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }
    }

    #[test]
    fn write_errors_are_ignored() {
        let mut consumer = WriterConsumer::new(Broken);
        consumer.on_line("lost\n");
        consumer.on_line("also lost\n");
    }
}
