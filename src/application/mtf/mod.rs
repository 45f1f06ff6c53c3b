mod confirmer;

pub use confirmer::MtfConfirmer;
