use bdfplus::{
    BdfReader, BdfWriter, ChannelSelector, Format, HeaderBuilder, IoStrategy, Matrix, ReadOptions,
    StatusChannel, TimeSelector, WriteOptions,
};
use std::fs;
use std::path::Path;

fn cleanup_test_file(filename: &str) {
    if Path::new(filename).exists() {
        fs::remove_file(filename).ok();
    }
}

fn write_fixture(filename: &str, strategy: IoStrategy, workers: usize, chunk: usize) {
    let labels: Vec<String> = (1..=16)
        .map(|i| format!("E{}", i))
        .chain(std::iter::once("Status".to_string()))
        .collect();
    let mut samples = vec![32; 16];
    samples.push(32);
    samples[3] = 8;
    let header = HeaderBuilder::new(Format::Bdf, &labels[..])
        .n_data_records(40)
        .record_duration(0.5)
        .samples_per_record(samples)
        .physical_range(
            vec![-1000.0; 16].into_iter().chain([-8_388_608.0]).collect(),
            vec![1000.0; 16].into_iter().chain([8_388_607.0]).collect(),
        )
        .digital_range(
            vec![-8_388_608; 17],
            vec![8_388_607; 17],
        )
        .build()
        .unwrap();

    let rows = (0..16)
        .map(|ch| {
            let n = header.samples_per_record[ch] * 40;
            (0..n).map(|i| ((i * 7 + ch * 13) % 1999) as f64 - 999.0).collect()
        })
        .collect();
    let mut status = StatusChannel::zeroed(32 * 40);
    status.low.iter_mut().enumerate().for_each(|(i, b)| *b = (i % 251) as u8);

    let opts = WriteOptions::default()
        .strategy(strategy)
        .concurrency(workers)
        .chunk_size_hint(chunk);
    BdfWriter::create(filename)
        .unwrap()
        .write(&header, &Matrix::from_rows(rows), Some(&status), &opts)
        .unwrap();
}

#[test]
fn test_write_strategies_produce_identical_files() {
    let configs = [
        ("test_strategy_seq_1.bdf", IoStrategy::Sequential, 1, 1),
        ("test_strategy_seq_4.bdf", IoStrategy::Sequential, 4, 10_000),
        ("test_strategy_map_1.bdf", IoStrategy::Mapped, 1, 0),
        ("test_strategy_map_8.bdf", IoStrategy::Mapped, 8, 0),
    ];
    for (filename, strategy, workers, chunk) in configs {
        write_fixture(filename, strategy, workers, chunk);
    }

    let reference = fs::read(configs[0].0).unwrap();
    for (filename, ..) in &configs[1..] {
        assert_eq!(fs::read(filename).unwrap(), reference, "{} differs", filename);
    }

    for (filename, ..) in configs {
        cleanup_test_file(filename);
    }
}

#[test]
fn test_read_is_independent_of_strategy_and_workers() {
    let filename = "test_strategy_read.bdf";
    write_fixture(filename, IoStrategy::Mapped, 4, 0);
    let reader = BdfReader::open(filename).unwrap();

    let base = ReadOptions::default()
        .channels(ChannelSelector::Range(2..=12))
        .time(TimeSelector::Seconds(1.2, 13.7))
        .read_status(true);
    let reference = reader
        .read::<f64>(&base.clone().strategy(IoStrategy::Sequential).concurrency(1))
        .unwrap();
    assert_eq!(reference.channels.len(), 11);
    assert_eq!(reference.records.first(), Some(2));
    assert_eq!(reference.records.last(), Some(28));
    // E4 以较低采样率存储
    assert_eq!(reference.data.row(2).len(), 8 * 27);

    for strategy in [IoStrategy::Sequential, IoStrategy::Mapped] {
        for workers in [1, 2, 3, 8, 64] {
            let recording = reader
                .read::<f64>(&base.clone().strategy(strategy).concurrency(workers))
                .unwrap();
            assert_eq!(recording.data, reference.data, "{:?} x{}", strategy, workers);
            assert_eq!(recording.status, reference.status);
            assert_eq!(recording.header, reference.header);
        }
    }

    drop(reader);
    cleanup_test_file(filename);
}
