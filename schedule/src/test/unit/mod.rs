mod binding;
mod blockize;
mod divide;
mod tensorize;
mod trace;
