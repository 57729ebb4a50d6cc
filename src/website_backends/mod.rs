/// Backend for <https://www.cpubenchmark.net/>
pub mod cpubenchmark;
